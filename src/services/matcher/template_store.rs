use super::mask::MaskShape;
use crate::error::{AutofishError, Result};
use dashmap::DashMap;
use image::{GrayImage, Luma, RgbImage, RgbaImage};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Загруженный шаблон: RGB-пиксели и необязательная маска прозрачности
#[derive(Debug, Clone)]
pub struct Template {
    pub key: PathBuf,
    pub pixels: RgbImage,
    /// 255 там, где пиксель учитывается (alpha > 0), 0 там, где игнорируется
    pub mask: Option<GrayImage>,
}

/// Статистика прозрачности шаблона
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransparencyInfo {
    pub has_alpha: bool,
    pub total_pixels: u32,
    pub opaque_pixels: u32,
    pub transparent_pixels: u32,
    pub transparency_ratio: f32,
}

impl Template {
    /// Собрать шаблон из RGBA-изображения; маска появляется только при наличии альфа-канала
    pub fn from_rgba(key: impl Into<PathBuf>, image: &RgbaImage, has_alpha: bool) -> Result<Self> {
        let key = key.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(AutofishError::template(&key, "пустое изображение"));
        }

        let pixels = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            image::Rgb([r, g, b])
        });

        let mask = if has_alpha {
            let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
                Luma([if image.get_pixel(x, y).0[3] > 0 { 255 } else { 0 }])
            });
            if mask.pixels().all(|p| p.0[0] == 0) {
                return Err(AutofishError::template(&key, "шаблон полностью прозрачен"));
            }
            Some(mask)
        } else {
            None
        };

        Ok(Self { key, pixels, mask })
    }

    /// Загрузить PNG (или другой поддерживаемый формат) с диска
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path).map_err(|e| AutofishError::template(path, e.to_string()))?;
        let has_alpha = decoded.color().has_alpha();
        Self::from_rgba(path, &decoded.to_rgba8(), has_alpha)
    }

    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Маска, если она есть и вызывающий просит её учитывать
    pub fn mask_for(&self, use_mask: bool) -> Option<&GrayImage> {
        if use_mask {
            self.mask.as_ref()
        } else {
            None
        }
    }

    pub fn transparency_info(&self) -> TransparencyInfo {
        let (width, height) = self.size();
        let total_pixels = width * height;
        let opaque_pixels = match &self.mask {
            Some(mask) => mask.pixels().filter(|p| p.0[0] > 0).count() as u32,
            None => total_pixels,
        };
        let transparent_pixels = total_pixels - opaque_pixels;

        TransparencyInfo {
            has_alpha: self.mask.is_some(),
            total_pixels,
            opaque_pixels,
            transparent_pixels,
            transparency_ratio: transparent_pixels as f32 / total_pixels as f32,
        }
    }
}

/// Кэш шаблонов с ленивой загрузкой.
///
/// Первый обратившийся к пути загружает файл, одновременные обращения ждут
/// ту же ячейку и получают один и тот же `Arc<Template>`.
#[derive(Default)]
pub struct TemplateStore {
    cache: DashMap<PathBuf, Arc<OnceCell<Arc<Template>>>>,
    shape_masks: DashMap<(PathBuf, MaskShape), Arc<GrayImage>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<Template>> {
        // Клонируем ячейку, чтобы не держать шард DashMap во время чтения файла
        let cell = Arc::clone(self.cache.entry(path.to_path_buf()).or_default().value());

        cell.get_or_try_init(|| {
            let template = Template::open(path)?;
            let (width, height) = template.size();
            info!(
                "Загружен шаблон {} ({}x{}, маска: {})",
                path.display(),
                width,
                height,
                template.mask.is_some()
            );
            Ok(Arc::new(template))
        })
        .cloned()
    }

    /// Зарегистрировать шаблон, собранный в памяти, под произвольным ключом
    pub fn insert(&self, template: Template) -> Arc<Template> {
        let key = template.key.clone();
        let template = Arc::new(template);
        let cell = OnceCell::with_value(Arc::clone(&template));
        self.shape_masks.retain(|(path, _), _| path != &key);
        self.cache.insert(key, Arc::new(cell));
        template
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.cache
            .get(path)
            .map(|cell| cell.get().is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Маска заданной формы под размер шаблона; строится один раз на пару (шаблон, форма)
    pub fn shape_mask(&self, template: &Template, shape: MaskShape) -> Arc<GrayImage> {
        let entry = self.shape_masks.entry((template.key.clone(), shape)).or_insert_with(|| {
            let (width, height) = template.size();
            debug!("Построена маска {} для {} ({}x{})", shape, template.key.display(), width, height);
            Arc::new(shape.build(width, height))
        });
        Arc::clone(entry.value())
    }

    pub fn clear(&self) {
        let count = self.len();
        self.cache.clear();
        self.shape_masks.clear();
        debug!("Кэш шаблонов очищен ({} шаблонов)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::thread;

    fn write_png(dir: &Path, name: &str, image: &RgbaImage) -> PathBuf {
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    fn ring(size: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if x == 0 || y == 0 || x == size - 1 || y == size - 1 {
                Rgba([255, 100, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_mask_from_alpha_channel() {
        let template = Template::from_rgba("ring", &ring(4), true).unwrap();
        let mask = template.mask.as_ref().unwrap();

        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(1, 1).0[0], 0);

        let info = template.transparency_info();
        assert!(info.has_alpha);
        assert_eq!(info.total_pixels, 16);
        assert_eq!(info.opaque_pixels, 12);
        assert_eq!(info.transparent_pixels, 4);
        assert!((info.transparency_ratio - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_template_without_alpha_has_no_mask() {
        let template = Template::from_rgba("solid", &ring(4), false).unwrap();
        assert!(template.mask.is_none());
        assert!(template.mask_for(true).is_none());
        assert_eq!(template.transparency_info().opaque_pixels, 16);
    }

    #[test]
    fn test_fully_transparent_template_rejected() {
        let empty = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 0]));
        assert!(Template::from_rgba("empty", &empty, true).is_err());
    }

    #[test]
    fn test_load_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "ring.png", &ring(6));
        let store = TemplateStore::new();

        let first = store.load(&path).unwrap();
        let second = store.load(&path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.contains(&path));
        assert_eq!(store.len(), 1);
        assert!(first.mask.is_some());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_file_is_template_error() {
        let store = TemplateStore::new();
        let result = store.load(Path::new("/nonexistent/bobber.png"));

        assert!(matches!(result, Err(AutofishError::Template { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "ring.png", &ring(8));
        let store = Arc::new(TemplateStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let path = path.clone();
                thread::spawn(move || store.load(&path).unwrap())
            })
            .collect();

        let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(loaded.iter().all(|t| Arc::ptr_eq(t, &loaded[0])));
    }

    #[test]
    fn test_insert_in_memory_template() {
        let store = TemplateStore::new();
        let template = Template::from_rgba("memory:bobber", &ring(4), true).unwrap();
        let inserted = store.insert(template);

        let loaded = store.load(Path::new("memory:bobber")).unwrap();
        assert!(Arc::ptr_eq(&inserted, &loaded));
    }

    #[test]
    fn test_shape_mask_cached_per_template_and_shape() {
        let store = TemplateStore::new();
        let template = store.insert(Template::from_rgba("memory:float", &ring(16), true).unwrap());

        let circle = store.shape_mask(&template, MaskShape::Circle);
        assert_eq!(circle.dimensions(), (16, 16));
        assert!(Arc::ptr_eq(&circle, &store.shape_mask(&template, MaskShape::Circle)));

        let rounded = store.shape_mask(&template, MaskShape::RoundedRect);
        assert!(!Arc::ptr_eq(&circle, &rounded));

        // Замена шаблона под тем же ключом сбрасывает построенные маски
        let resized = store.insert(Template::from_rgba("memory:float", &ring(8), true).unwrap());
        assert_eq!(store.shape_mask(&resized, MaskShape::Circle).dimensions(), (8, 8));
    }
}
