use super::TemplateMatcher;
use crate::events::TemplateMatch;
use image::{GrayImage, RgbImage};
use std::cmp::Ordering;

const FLAT_EPSILON: f64 = 1e-6;

/// Нормированная взаимная корреляция (аналог TM_CCOEFF_NORMED) с маской.
///
/// Среднее вычитается по каждому каналу RGB отдельно, суммы берутся только
/// по пикселям маски. Результат лежит в -1.0..=1.0, отрицательные значения
/// для удобства приводятся к нулю.
#[derive(Debug, Default, Clone, Copy)]
pub struct NccMatcher;

impl NccMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateMatcher for NccMatcher {
    fn best_match(
        &self,
        screen: &RgbImage,
        template: &RgbImage,
        mask: Option<&GrayImage>,
    ) -> Option<TemplateMatch> {
        let prepared = PreparedTemplate::new(template, mask)?;
        let (max_x, max_y) = prepared.search_bounds(screen)?;

        let mut best: Option<(f32, u32, u32)> = None;
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = prepared.score(screen, x, y);
                if best.map_or(true, |(current, _, _)| score > current) {
                    best = Some((score, x, y));
                }
            }
        }

        best.map(|(score, x, y)| prepared.to_match(x, y, score))
    }

    fn all_matches(
        &self,
        screen: &RgbImage,
        template: &RgbImage,
        mask: Option<&GrayImage>,
        threshold: f32,
    ) -> Vec<TemplateMatch> {
        let Some(prepared) = PreparedTemplate::new(template, mask) else {
            return Vec::new();
        };
        let Some((max_x, max_y)) = prepared.search_bounds(screen) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = prepared.score(screen, x, y);
                if score >= threshold {
                    candidates.push(prepared.to_match(x, y, score));
                }
            }
        }

        candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

        // Соседние позиции одного и того же объекта схлопываем в лучшую
        let (width, height) = prepared.size;
        let mut accepted: Vec<TemplateMatch> = Vec::new();
        for candidate in candidates {
            let overlaps = accepted.iter().any(|kept| {
                (kept.position.0 - candidate.position.0).unsigned_abs() < width
                    && (kept.position.1 - candidate.position.1).unsigned_abs() < height
            });
            if !overlaps {
                accepted.push(candidate);
            }
        }
        accepted
    }
}

/// Шаблон, приведённый к виду, удобному для скользящего окна
struct PreparedTemplate {
    size: (u32, u32),
    masked: bool,
    /// Смещения учитываемых пикселей
    offsets: Vec<(u32, u32)>,
    /// Значения шаблона минус среднее, по каналам
    centered: Vec<[f64; 3]>,
    means: [f64; 3],
    norm: f64,
}

impl PreparedTemplate {
    fn new(template: &RgbImage, mask: Option<&GrayImage>) -> Option<Self> {
        let (width, height) = template.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        if let Some(mask) = mask {
            if mask.dimensions() != (width, height) {
                return None;
            }
        }

        let mut offsets = Vec::with_capacity((width * height) as usize);
        let mut values = Vec::with_capacity(offsets.capacity());
        for y in 0..height {
            for x in 0..width {
                if mask.map_or(true, |m| m.get_pixel(x, y).0[0] > 0) {
                    offsets.push((x, y));
                    let p = template.get_pixel(x, y).0;
                    values.push([f64::from(p[0]), f64::from(p[1]), f64::from(p[2])]);
                }
            }
        }
        if offsets.is_empty() {
            return None;
        }

        let n = offsets.len() as f64;
        let mut means = [0.0; 3];
        for value in &values {
            for c in 0..3 {
                means[c] += value[c];
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let centered: Vec<[f64; 3]> = values
            .iter()
            .map(|v| [v[0] - means[0], v[1] - means[1], v[2] - means[2]])
            .collect();
        let norm = centered
            .iter()
            .map(|v| v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
            .sum();

        Some(Self {
            size: (width, height),
            masked: mask.is_some(),
            offsets,
            centered,
            means,
            norm,
        })
    }

    fn search_bounds(&self, screen: &RgbImage) -> Option<(u32, u32)> {
        let (sw, sh) = screen.dimensions();
        let (tw, th) = self.size;
        if tw > sw || th > sh {
            return None;
        }
        Some((sw - tw, sh - th))
    }

    fn score(&self, screen: &RgbImage, x: u32, y: u32) -> f32 {
        let raw = screen.as_raw();
        let stride = screen.width() as usize * 3;
        let n = self.offsets.len() as f64;

        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];
        let mut cross = 0.0f64;

        for (&(dx, dy), t) in self.offsets.iter().zip(&self.centered) {
            let idx = (y + dy) as usize * stride + (x + dx) as usize * 3;
            for c in 0..3 {
                let v = f64::from(raw[idx + c]);
                sum[c] += v;
                sum_sq[c] += v * v;
                cross += t[c] * v;
            }
        }

        // Однотонный шаблон: корреляция не определена, сравниваем средние цвета
        if self.norm < FLAT_EPSILON {
            let diff: f64 = (0..3).map(|c| (sum[c] / n - self.means[c]).abs()).sum();
            return (1.0 - diff / (3.0 * 255.0)) as f32;
        }

        let variance: f64 = (0..3).map(|c| sum_sq[c] - sum[c] * sum[c] / n).sum();
        if variance < FLAT_EPSILON {
            return 0.0;
        }

        (cross / (self.norm * variance).sqrt()).clamp(0.0, 1.0) as f32
    }

    fn to_match(&self, x: u32, y: u32, score: f32) -> TemplateMatch {
        TemplateMatch::new((x as i32, y as i32), score, self.size, self.masked)
    }
}
