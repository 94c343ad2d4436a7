use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parses `#RRGGBB` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl From<Rgb> for genpdf::style::Color {
    fn from(c: Rgb) -> Self {
        genpdf::style::Color::Rgb(c.0, c.1, c.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Palette {
    pub primary: Rgb,
    pub secondary: Rgb,
    pub accent_1: Rgb,
    pub accent_2: Rgb,
    pub light_bg: Rgb,
    pub text_dark: Rgb,
    pub text_light: Rgb,
    pub success: Rgb,
    pub warning: Rgb,
    pub danger: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: Rgb(0x2D, 0xD4, 0xBF),
            secondary: Rgb(0xF4, 0x72, 0xB6),
            accent_1: Rgb(0xA7, 0x8B, 0xFA),
            accent_2: Rgb(0xFB, 0xBF, 0x24),
            light_bg: Rgb(0xF8, 0xFA, 0xFC),
            text_dark: Rgb(0x1E, 0x29, 0x3B),
            text_light: Rgb(0x64, 0x74, 0x8B),
            success: Rgb(0x10, 0xB9, 0x81),
            warning: Rgb(0xF9, 0x73, 0x16),
            danger: Rgb(0xEF, 0x44, 0x44),
        }
    }
}

impl Palette {
    pub fn grade_color(&self, grade: ScoreGrade) -> Rgb {
        match grade {
            ScoreGrade::Excellent => self.success,
            ScoreGrade::Good => self.accent_2,
            ScoreGrade::Fair => self.warning,
            ScoreGrade::Poor => self.danger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreGrade {
    pub fn label(self) -> &'static str {
        match self {
            ScoreGrade::Excellent => "Excellent",
            ScoreGrade::Good => "Good",
            ScoreGrade::Fair => "Fair",
            ScoreGrade::Poor => "Poor",
        }
    }
}

/// Lower bounds of each grade; a score equal to a bound belongs to the higher grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScoreThresholds {
    pub excellent: u8,
    pub good: u8,
    pub fair: u8,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            excellent: 80,
            good: 60,
            fair: 40,
        }
    }
}

impl ScoreThresholds {
    pub fn grade(&self, score: u8) -> ScoreGrade {
        if score >= self.excellent {
            ScoreGrade::Excellent
        } else if score >= self.good {
            ScoreGrade::Good
        } else if score >= self.fair {
            ScoreGrade::Fair
        } else {
            ScoreGrade::Poor
        }
    }
}
