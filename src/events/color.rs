use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Цвет пикселя в RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Цвет-заглушка, который возвращается при неудачном захвате
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Совпадают ли цвета: каждый канал отличается не больше чем на `tolerance`
    pub fn matches(&self, other: &Rgb, tolerance: u8) -> bool {
        colors_match(self, other, tolerance)
    }

    /// Суммарная разница по каналам: Σ|aᵢ − bᵢ|
    pub fn difference(&self, other: &Rgb) -> u32 {
        self.channels()
            .iter()
            .zip(other.channels().iter())
            .map(|(&a, &b)| u32::from(a.abs_diff(b)))
            .sum()
    }

    /// Максимальная разница среди каналов
    pub fn max_channel_difference(&self, other: &Rgb) -> u8 {
        self.channels()
            .iter()
            .zip(other.channels().iter())
            .map(|(&a, &b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }
}

/// Проверка совпадения двух цветов с допуском по каждому каналу
pub fn colors_match(a: &Rgb, b: &Rgb, tolerance: u8) -> bool {
    a.max_channel_difference(b) <= tolerance
}

impl From<[u8; 3]> for Rgb {
    fn from(value: [u8; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(value: Rgb) -> Self {
        value.channels()
    }
}

impl From<image::Rgb<u8>> for Rgb {
    fn from(value: image::Rgb<u8>) -> Self {
        Self::new(value.0[0], value.0[1], value.0[2])
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Разбор строки вида `#ff6400` или `ff6400`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("Неверный формат цвета: {}", s));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("Неверный формат цвета {}: {}", s, e))
        };

        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({}, {}, {})", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_match_is_per_channel() {
        let a = Rgb::new(100, 100, 100);

        assert!(colors_match(&a, &Rgb::new(105, 95, 100), 5));
        assert!(!colors_match(&a, &Rgb::new(106, 100, 100), 5));
        assert!(colors_match(&a, &a, 0));
        assert!(!colors_match(&a, &Rgb::new(100, 100, 101), 0));
    }

    #[test]
    fn test_colors_match_matches_definition_and_is_symmetric() {
        let samples = [
            Rgb::new(0, 0, 0),
            Rgb::new(255, 255, 255),
            Rgb::new(12, 200, 31),
            Rgb::new(250, 3, 128),
            Rgb::new(128, 128, 127),
        ];

        for tolerance in [0u8, 1, 5, 30, 127, 255] {
            for a in &samples {
                for b in &samples {
                    let expected = a
                        .channels()
                        .iter()
                        .zip(b.channels().iter())
                        .all(|(&x, &y)| (i16::from(x) - i16::from(y)).abs() <= i16::from(tolerance));

                    assert_eq!(colors_match(a, b, tolerance), expected);
                    assert_eq!(colors_match(a, b, tolerance), colors_match(b, a, tolerance));
                }
            }
        }
    }

    #[test]
    fn test_difference_sums_channels() {
        let a = Rgb::new(10, 20, 30);
        let b = Rgb::new(20, 10, 60);

        assert_eq!(a.difference(&b), 10 + 10 + 30);
        assert_eq!(b.difference(&a), 50);
        assert_eq!(Rgb::BLACK.difference(&Rgb::new(255, 255, 255)), 765);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!("#ff6400".parse::<Rgb>().unwrap(), Rgb::new(255, 100, 0));
        assert_eq!("00FF10".parse::<Rgb>().unwrap(), Rgb::new(0, 255, 16));
        assert!("#ff64".parse::<Rgb>().is_err());
        assert!("#gg6400".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Rgb::new(255, 100, 0).to_string(), "RGB(255, 100, 0)");
    }
}
