//! Celestial coordinates and frame conversion.
//!
//! Coordinates are stored in degrees and always carry their [`Frame`]. Frame
//! conversion rotates unit vectors, so it is total over the sphere: the poles
//! need no special casing.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Vec3;

/// Rotation from equatorial J2000 to galactic coordinates (IAU 1958 / Hipparcos).
///
/// Rows are the galactic axes expressed in the equatorial frame, so the inverse
/// is the transpose.
const EQ_TO_GAL: [[f64; 3]; 3] = [
    [-0.054_875_560_416_215_4, -0.873_437_090_234_885_0, -0.483_835_015_548_713_2],
    [0.494_109_427_875_583_7, -0.444_829_629_960_011_2, 0.746_982_244_497_218_9],
    [-0.867_666_149_019_004_7, -0.198_076_373_431_201_5, 0.455_983_776_175_066_9],
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// ICRS / J2000 right ascension and declination.
    #[default]
    Equatorial,
    Galactic,
}

impl Frame {
    pub fn label(self) -> &'static str {
        match self {
            Frame::Equatorial => "J2000",
            Frame::Galactic => "GAL",
        }
    }
}

impl FromStr for Frame {
    type Err = CoordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "j2000" | "j2000d" | "icrs" | "icrsd" | "equatorial" | "eq" => Ok(Frame::Equatorial),
            "gal" | "galactic" => Ok(Frame::Galactic),
            other => Err(CoordParseError::UnknownFrame(other.to_string())),
        }
    }
}

/// Deserializes a frame from any name `Frame::from_str` accepts, such as
/// `"J2000"` or `"GAL"`.
pub fn deserialize_frame_name<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Frame, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordParseError {
    Empty,
    TokenCount(usize),
    Number(String),
    OutOfRange(&'static str),
    UnknownFrame(String),
}

impl std::fmt::Display for CoordParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordParseError::Empty => write!(f, "empty coordinate string"),
            CoordParseError::TokenCount(n) => {
                write!(f, "expected 2 (decimal) or 6 (sexagesimal) fields, got {n}")
            }
            CoordParseError::Number(tok) => write!(f, "not a number: {tok:?}"),
            CoordParseError::OutOfRange(what) => write!(f, "{what} out of range"),
            CoordParseError::UnknownFrame(name) => write!(f, "unknown coordinate frame: {name:?}"),
        }
    }
}

impl std::error::Error for CoordParseError {}

/// A position on the celestial sphere, in degrees.
///
/// Invariant: `lon ∈ [0, 360)` and `lat ∈ [-90, 90]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SkyCoord {
    lon: f64,
    lat: f64,
    frame: Frame,
}

impl SkyCoord {
    /// Builds a coordinate, wrapping `lon` into `[0, 360)` and clamping `lat`.
    pub fn new(lon: f64, lat: f64, frame: Frame) -> Self {
        let mut lon = lon.rem_euclid(360.0);
        if lon >= 360.0 {
            lon = 0.0;
        }
        Self {
            lon,
            lat: lat.clamp(-90.0, 90.0),
            frame,
        }
    }

    pub fn equatorial(ra: f64, dec: f64) -> Self {
        Self::new(ra, dec, Frame::Equatorial)
    }

    pub fn galactic(l: f64, b: f64) -> Self {
        Self::new(l, b, Frame::Galactic)
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn to_unit_vector(&self) -> Vec3 {
        let (sin_lon, cos_lon) = self.lon.to_radians().sin_cos();
        let (sin_lat, cos_lat) = self.lat.to_radians().sin_cos();
        Vec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// Inverse of [`SkyCoord::to_unit_vector`]; `v` need not be normalized.
    pub fn from_vector(v: Vec3, frame: Frame) -> Self {
        let lon = v.y.atan2(v.x).to_degrees();
        let lat = v.z.atan2(v.x.hypot(v.y)).to_degrees();
        Self::new(lon, lat, frame)
    }

    pub fn to_frame(&self, frame: Frame) -> SkyCoord {
        match frame {
            Frame::Galactic => to_galactic(self),
            Frame::Equatorial => to_equatorial(self),
        }
    }

    /// Great-circle distance in degrees (haversine); `other` is converted into this frame.
    pub fn angular_distance(&self, other: &SkyCoord) -> f64 {
        let other = other.to_frame(self.frame);
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
    }

    /// Parses `"lon lat"` in decimal degrees or six sexagesimal fields.
    ///
    /// Sexagesimal longitude is read as hours for the equatorial frame
    /// (`"05 34 31.9 +22 00 52"`) and as degrees otherwise. Colons are
    /// accepted as field separators.
    pub fn parse(text: &str, frame: Frame) -> Result<Self, CoordParseError> {
        let cleaned = text.replace(':', " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let (lon, lat) = match tokens.len() {
            0 => return Err(CoordParseError::Empty),
            2 => (parse_number(tokens[0])?, parse_number(tokens[1])?),
            6 => {
                let lon_units = parse_number(tokens[0])?
                    + parse_number(tokens[1])? / 60.0
                    + parse_number(tokens[2])? / 3600.0;
                let lon = match frame {
                    Frame::Equatorial => lon_units * 15.0,
                    Frame::Galactic => lon_units,
                };
                let negative = tokens[3].starts_with('-');
                let lat_abs = parse_number(tokens[3])?.abs()
                    + parse_number(tokens[4])? / 60.0
                    + parse_number(tokens[5])? / 3600.0;
                (lon, if negative { -lat_abs } else { lat_abs })
            }
            n => return Err(CoordParseError::TokenCount(n)),
        };

        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordParseError::OutOfRange("latitude"));
        }
        Ok(Self::new(lon, lat, frame))
    }
}

fn parse_number(tok: &str) -> Result<f64, CoordParseError> {
    match tok.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CoordParseError::Number(tok.to_string())),
    }
}

fn rotate(m: &[[f64; 3]; 3], v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

fn rotate_transposed(m: &[[f64; 3]; 3], v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[1][0] * v.y + m[2][0] * v.z,
        m[0][1] * v.x + m[1][1] * v.y + m[2][1] * v.z,
        m[0][2] * v.x + m[1][2] * v.y + m[2][2] * v.z,
    )
}

pub fn to_galactic(coord: &SkyCoord) -> SkyCoord {
    if coord.frame == Frame::Galactic {
        return *coord;
    }
    let v = coord.to_unit_vector();
    debug_assert!((v.norm() - 1.0).abs() < 1e-9, "frame conversion expects unit vectors");
    SkyCoord::from_vector(rotate(&EQ_TO_GAL, v), Frame::Galactic)
}

pub fn to_equatorial(coord: &SkyCoord) -> SkyCoord {
    if coord.frame == Frame::Equatorial {
        return *coord;
    }
    let v = coord.to_unit_vector();
    debug_assert!((v.norm() - 1.0).abs() < 1e-9, "frame conversion expects unit vectors");
    SkyCoord::from_vector(rotate_transposed(&EQ_TO_GAL, v), Frame::Equatorial)
}

/// Rotates a unit vector between frames without going through lon/lat.
pub fn convert_vector(v: Vec3, from: Frame, to: Frame) -> Vec3 {
    match (from, to) {
        (Frame::Equatorial, Frame::Galactic) => rotate(&EQ_TO_GAL, v),
        (Frame::Galactic, Frame::Equatorial) => rotate_transposed(&EQ_TO_GAL, v),
        _ => v,
    }
}

#[cfg(test)]
mod tests {
    use super::{CoordParseError, Frame, SkyCoord, to_equatorial, to_galactic};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn assert_same_point(a: &SkyCoord, b: &SkyCoord, eps_deg: f64) {
        let d = a.angular_distance(b);
        assert!(d <= eps_deg, "{a:?} vs {b:?}: {d} deg apart");
    }

    #[test]
    fn constructor_normalizes_longitude() {
        assert_close(SkyCoord::equatorial(-10.0, 0.0).lon(), 350.0, 1e-12);
        assert_close(SkyCoord::equatorial(720.5, 0.0).lon(), 0.5, 1e-12);
        assert_eq!(SkyCoord::equatorial(-1e-20, 0.0).lon(), 0.0);
        assert_eq!(SkyCoord::equatorial(0.0, 91.0).lat(), 90.0);
    }

    #[test]
    fn galactic_center_matches_reference() {
        // Sgr A* region: l=0, b=0 is at RA 266.405, Dec -28.936 (J2000).
        let eq = to_equatorial(&SkyCoord::galactic(0.0, 0.0));
        assert_close(eq.lon(), 266.404_99, 1e-3);
        assert_close(eq.lat(), -28.936_17, 1e-3);
    }

    #[test]
    fn galactic_north_pole_matches_reference() {
        let gal = to_galactic(&SkyCoord::equatorial(192.859_48, 27.128_25));
        assert_close(gal.lat(), 90.0, 1e-4);
    }

    #[test]
    fn frame_round_trip_everywhere() {
        let mut lat = -90.0;
        while lat <= 90.0 {
            let mut lon = 0.0;
            while lon < 360.0 {
                let c = SkyCoord::equatorial(lon, lat);
                let back = to_equatorial(&to_galactic(&c));
                assert_same_point(&c, &back, 1e-6);
                if lat.abs() < 89.9 {
                    assert_close(back.lat(), c.lat(), 1e-6);
                }
                lon += 17.5;
            }
            lat += 7.5;
        }
    }

    #[test]
    fn poles_convert_without_nan() {
        for c in [SkyCoord::galactic(0.0, 90.0), SkyCoord::galactic(123.0, -90.0)] {
            let eq = c.to_frame(Frame::Equatorial);
            assert!(eq.lon().is_finite() && eq.lat().is_finite());
            assert_same_point(&c, &eq.to_frame(Frame::Galactic), 1e-6);
        }
    }

    #[test]
    fn haversine_distance() {
        let a = SkyCoord::equatorial(0.0, 0.0);
        assert_close(a.angular_distance(&SkyCoord::equatorial(10.0, 0.0)), 10.0, 1e-12);
        assert_close(a.angular_distance(&SkyCoord::equatorial(0.0, 90.0)), 90.0, 1e-12);
        assert_close(a.angular_distance(&SkyCoord::equatorial(180.0, 0.0)), 180.0, 1e-9);
    }

    #[test]
    fn parses_decimal_and_sexagesimal() {
        let c = SkyCoord::parse("0 +0", Frame::Equatorial).unwrap();
        assert_eq!((c.lon(), c.lat()), (0.0, 0.0));

        let crab = SkyCoord::parse("05 34 31.94 +22 00 52.2", Frame::Equatorial).unwrap();
        assert_close(crab.lon(), 83.633_083, 1e-5);
        assert_close(crab.lat(), 22.014_5, 1e-4);

        let south = SkyCoord::parse("10:00:00 -00:30:00", Frame::Equatorial).unwrap();
        assert_close(south.lon(), 150.0, 1e-12);
        assert_close(south.lat(), -0.5, 1e-12);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(SkyCoord::parse("  ", Frame::Equatorial), Err(CoordParseError::Empty));
        assert_eq!(
            SkyCoord::parse("1 2 3", Frame::Equatorial),
            Err(CoordParseError::TokenCount(3))
        );
        assert!(matches!(
            SkyCoord::parse("abc 2", Frame::Equatorial),
            Err(CoordParseError::Number(_))
        ));
        for input in ["nan 10", "inf 10", "10 nan", "-inf 0", "05 34 NaN +22 00 52"] {
            assert!(
                matches!(SkyCoord::parse(input, Frame::Equatorial), Err(CoordParseError::Number(_))),
                "{input}"
            );
        }
        assert_eq!(
            SkyCoord::parse("10 95", Frame::Galactic),
            Err(CoordParseError::OutOfRange("latitude"))
        );
    }

    #[test]
    fn frame_names() {
        assert_eq!("J2000d".parse::<Frame>().unwrap(), Frame::Equatorial);
        assert_eq!("galactic".parse::<Frame>().unwrap(), Frame::Galactic);
        assert!("ecliptic".parse::<Frame>().is_err());
    }
}
