use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Форма маски, накладываемой на шаблон вместо его альфа-канала
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskShape {
    /// Круг в центре шаблона, радиус - половина меньшей стороны
    Circle,
    /// Эллипс, вписанный в шаблон
    Ellipse,
    /// Прямоугольник со скруглёнными углами, радиус - восьмая часть меньшей стороны
    RoundedRect,
}

impl MaskShape {
    /// Построить маску заданного размера: 255 внутри формы, 0 снаружи
    pub fn build(self, width: u32, height: u32) -> GrayImage {
        let (w, h) = (i64::from(width), i64::from(height));

        GrayImage::from_fn(width, height, |x, y| {
            let (x, y) = (i64::from(x), i64::from(y));
            let inside = match self {
                MaskShape::Circle => {
                    let radius = w.min(h) / 2;
                    let (dx, dy) = (x - w / 2, y - h / 2);
                    dx * dx + dy * dy <= radius * radius
                }
                MaskShape::Ellipse => {
                    let (a, b) = (w / 2, h / 2);
                    let (dx, dy) = (x - w / 2, y - h / 2);
                    dx * dx * b * b + dy * dy * a * a <= a * a * b * b
                }
                MaskShape::RoundedRect => {
                    let radius = w.min(h) / 8;
                    // Расстояние до внутреннего прямоугольника, в который вписаны центры углов
                    let nearest_x = x.clamp(radius, w - 1 - radius);
                    let nearest_y = y.clamp(radius, h - 1 - radius);
                    let (dx, dy) = (x - nearest_x, y - nearest_y);
                    dx * dx + dy * dy <= radius * radius
                }
            };
            Luma([if inside { 255 } else { 0 }])
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaskShape::Circle => "circle",
            MaskShape::Ellipse => "ellipse",
            MaskShape::RoundedRect => "rounded_rect",
        }
    }
}

impl fmt::Display for MaskShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
