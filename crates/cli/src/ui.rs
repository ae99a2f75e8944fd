use crate::style::Style;

pub struct Ui {
    style: Style,
    width: usize,
}

impl Ui {
    pub fn new(style: Style) -> Self {
        Self { style, width: 48 }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn rule(&self) -> String {
        "-".repeat(self.width)
    }

    pub fn kv(&self, key: &str, value: &str) -> String {
        let key_pad = 12usize;
        format!("{key:<key_pad$}: {value}")
    }

    /// `  • 001_init.sql.............. ✔ applied (12ms)`
    pub fn list_item(&self, label: &str, mark: &str, suffix: Option<&str>) -> String {
        let label_width = 36usize;
        let dots = if label.len() >= label_width {
            String::new()
        } else {
            ".".repeat(label_width - label.len())
        };

        match suffix {
            Some(suffix) if !suffix.is_empty() => {
                format!("  {} {label}{dots} {mark} {suffix}", self.style.bullet())
            }
            _ => format!("  {} {label}{dots} {mark}", self.style.bullet()),
        }
    }
}
