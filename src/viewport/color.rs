use std::fmt::Display;

/// Rolling 32 bit string hash over UTF-16 code units, `hash * 31 + unit` with wraparound.
pub fn label_hash(label: &str) -> i32 {
    label
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Hue in degrees assigned to a label. Different labels may share a hue.
pub fn label_hue(label: &str) -> u16 {
    label_hash(label).rem_euclid(360) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub hue: u16,
    /// Percent.
    pub saturation: u8,
    /// Percent.
    pub lightness: u8,
}

impl Hsl {
    /// Light background shade used for the body of a bar.
    pub fn fill(label: &str) -> Self {
        Self {
            hue: label_hue(label),
            saturation: 100,
            lightness: 80,
        }
    }

    /// Dark shade used for the stripe under a bar.
    pub fn border(label: &str) -> Self {
        Self {
            hue: label_hue(label),
            saturation: 100,
            lightness: 40,
        }
    }

    pub fn to_rgb(self) -> (u8, u8, u8) {
        let s = self.saturation as f64 / 100.;
        let l = self.lightness as f64 / 100.;
        let h = (self.hue % 360) as f64 / 60.;

        let chroma = (1. - (2. * l - 1.).abs()) * s;
        let x = chroma * (1. - (h % 2. - 1.).abs());
        let (r, g, b) = match h as u8 {
            0 => (chroma, x, 0.),
            1 => (x, chroma, 0.),
            2 => (0., chroma, x),
            3 => (0., x, chroma),
            4 => (x, 0., chroma),
            _ => (chroma, 0., x),
        };
        let m = l - chroma / 2.;
        let channel = |v: f64| ((v + m) * 255.).round() as u8;
        (channel(r), channel(g), channel(b))
    }
}

impl Display for Hsl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hsl({},{}%,{}%)", self.hue, self.saturation, self.lightness)
    }
}
