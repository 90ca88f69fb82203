use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutofishError {
    #[error("Ошибка конфигурации: {0}")]
    Config(String),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка изображения: {0}")]
    Image(#[from] image::ImageError),

    #[error("Не удалось загрузить шаблон {path}: {reason}")]
    Template { path: String, reason: String },

    #[error("Ошибка захвата экрана: {0}")]
    Capture(String),

    #[error("Наблюдатель '{0}' уже существует")]
    DuplicateWatcher(String),

    #[error("Наблюдатель '{0}' не найден")]
    UnknownWatcher(String),

    #[error("Нет активного tokio runtime: {0}")]
    NoRuntime(String),

    #[error("Недостаточно прав доступа: {0}")]
    Permission(String),

    #[error("Ошибка устройства ввода: {0}")]
    Input(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl AutofishError {
    pub fn unknown_watcher<T>(name: impl Into<String>) -> Result<T> {
        Err(AutofishError::UnknownWatcher(name.into()))
    }

    pub fn template(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        AutofishError::Template {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AutofishError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! autofish_error {
    (config, $($arg:tt)*) => {
        $crate::error::AutofishError::Config(format!($($arg)*))
    };
    (capture, $($arg:tt)*) => {
        $crate::error::AutofishError::Capture(format!($($arg)*))
    };
    (permission, $($arg:tt)*) => {
        $crate::error::AutofishError::Permission(format!($($arg)*))
    };
    (input, $($arg:tt)*) => {
        $crate::error::AutofishError::Input(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AutofishError::Internal(format!($($arg)*))
    };
}
