//! NESTED-scheme HEALPix arithmetic.
//!
//! A cell at order `o` lives on one of the 12 base faces and has integer
//! face coordinates `(ix, iy)` in `[0, nside)` with `nside = 2^o`. The nested
//! index is `face · nside² + interleave(ix, iy)`, so the four children of a
//! cell are exactly `4·index .. 4·index + 4`.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use foundation::math::Vec3;

/// Ring index of each base face's southern corner, in units of `nside`.
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
/// Longitude index of each base face's center, in units of `π/4`.
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

pub fn nside(order: u8) -> u64 {
    1u64 << order
}

/// Spreads the low 32 bits of `v` onto the even bit positions.
pub fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0xFFFF_FFFF;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

/// Inverse of [`spread_bits`]: gathers the even bits of `v`.
pub fn compress_bits(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF
}

/// `(ix, iy, face)` of a nested index.
pub fn index_to_xyf(order: u8, index: u64) -> (u64, u64, usize) {
    let shift = 2 * u32::from(order);
    let face = (index >> shift) as usize;
    let within = index & ((1u64 << shift) - 1);
    (compress_bits(within), compress_bits(within >> 1), face)
}

pub fn xyf_to_index(order: u8, ix: u64, iy: u64, face: usize) -> u64 {
    ((face as u64) << (2 * u32::from(order))) + spread_bits(ix) + (spread_bits(iy) << 1)
}

/// Maps continuous face coordinates `x, y ∈ [0, 1]` on `face` to a unit vector.
///
/// `(0, 0)` is the face's southern corner and `(1, 1)` its northern one.
pub fn face_point(x: f64, y: f64, face: usize) -> Vec3 {
    let jr = JRLL[face] as f64 - x - y;
    let (nr, z, sin_theta) = if jr < 1.0 {
        let nr = jr;
        let tmp = nr * nr / 3.0;
        (nr, 1.0 - tmp, (tmp * (2.0 - tmp)).max(0.0).sqrt())
    } else if jr > 3.0 {
        let nr = 4.0 - jr;
        let tmp = nr * nr / 3.0;
        (nr, tmp - 1.0, (tmp * (2.0 - tmp)).max(0.0).sqrt())
    } else {
        let z = (2.0 - jr) * 2.0 / 3.0;
        (1.0, z, ((1.0 - z) * (1.0 + z)).max(0.0).sqrt())
    };

    let mut tmp = JPLL[face] as f64 * nr + x - y;
    if tmp < 0.0 {
        tmp += 8.0;
    }
    if tmp >= 8.0 {
        tmp -= 8.0;
    }
    let phi = if nr < 1e-15 { 0.0 } else { FRAC_PI_4 * tmp / nr };
    let (sin_phi, cos_phi) = phi.sin_cos();
    Vec3::new(sin_theta * cos_phi, sin_theta * sin_phi, z)
}

/// Nested index of the cell containing direction `v` (need not be normalized).
pub fn index_at(order: u8, v: Vec3) -> u64 {
    let n = nside(order);
    let nside_f = n as f64;
    let norm = v.norm();
    let z = if norm > 0.0 { v.z / norm } else { 1.0 };
    let sin_theta = if norm > 0.0 { v.x.hypot(v.y) / norm } else { 0.0 };
    let phi = v.y.atan2(v.x);

    let za = z.abs();
    let mut tt = (phi / FRAC_PI_2).rem_euclid(4.0);
    if tt >= 4.0 {
        tt -= 4.0;
    }

    let (ix, iy, face) = if za <= 2.0 / 3.0 {
        let temp1 = nside_f * (0.5 + tt);
        let temp2 = nside_f * (z * 0.75);
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ifp = jp >> order;
        let ifm = jm >> order;
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        let mask = n as i64 - 1;
        let ix = jm & mask;
        let iy = n as i64 - (jp & mask) - 1;
        (ix as u64, iy as u64, face as usize)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = nside_f * sin_theta * (3.0 / (1.0 + za)).sqrt();
        let last = n as i64 - 1;
        let jp = ((tp * tmp) as i64).min(last);
        let jm = (((1.0 - tp) * tmp) as i64).min(last);
        if z >= 0.0 {
            ((last - jm) as u64, (last - jp) as u64, ntt as usize)
        } else {
            (jp as u64, jm as u64, (ntt + 8) as usize)
        }
    };
    xyf_to_index(order, ix, iy, face)
}
