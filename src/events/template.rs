use serde::{Deserialize, Serialize};
use std::fmt;

/// Прямоугольная область экрана в пикселях
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Область в один пиксель
    pub fn pixel(x: i32, y: i32) -> Self {
        Self::new(x, y, 1, 1)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Лучшее совпадение шаблона на экране
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    /// Левый верхний угол совпадения
    pub position: (i32, i32),
    /// Уверенность 0.0..=1.0
    pub confidence: f32,
    pub center: (i32, i32),
    pub size: (u32, u32),
    /// Использовалась ли маска прозрачности
    pub masked: bool,
}

impl TemplateMatch {
    pub fn new(position: (i32, i32), confidence: f32, size: (u32, u32), masked: bool) -> Self {
        let center = (
            position.0 + (size.0 / 2) as i32,
            position.1 + (size.1 / 2) as i32,
        );
        Self {
            position,
            confidence,
            center,
            size,
            masked,
        }
    }

    /// Сдвинуть совпадение из координат области в координаты экрана
    pub fn translated(mut self, dx: i32, dy: i32) -> Self {
        self.position = (self.position.0 + dx, self.position.1 + dy);
        self.center = (self.center.0 + dx, self.center.1 + dy);
        self
    }

    /// Евклидово расстояние между центрами
    pub fn distance_to(&self, other: &TemplateMatch) -> f64 {
        let dx = f64::from(self.center.0) - f64::from(other.center.0);
        let dy = f64::from(self.center.1) - f64::from(other.center.1);
        dx.hypot(dy)
    }
}

impl fmt::Display for TemplateMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) conf={:.3}",
            self.center.0, self.center.1, self.confidence
        )
    }
}
