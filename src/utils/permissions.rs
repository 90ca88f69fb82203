use crate::error::{AutofishError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{info, warn};

const UINPUT_DEVICE: &str = "/dev/uinput";

/// Проверить окружение: графическую сессию и, если ввод настоящий, доступ к uinput
pub fn check_permissions(dry_run: bool) -> Result<()> {
    info!("Проверка прав доступа...");

    check_display()?;

    if dry_run {
        info!("Режим сухого запуска - проверка {} пропущена", UINPUT_DEVICE);
    } else {
        check_uinput_access(Path::new(UINPUT_DEVICE))?;
    }

    check_not_root();

    info!("Проверка прав доступа завершена успешно");
    Ok(())
}

fn check_display() -> Result<()> {
    let session = std::env::var("WAYLAND_DISPLAY")
        .ok()
        .or_else(|| std::env::var("DISPLAY").ok())
        .filter(|value| !value.is_empty());

    match session {
        Some(session) => {
            info!("Графическая сессия: {}", session);
            Ok(())
        }
        None => {
            // Захват экрана всё равно может сработать (например, через портал), поэтому только предупреждаем
            warn!("Не заданы WAYLAND_DISPLAY и DISPLAY - захват экрана может быть недоступен");
            Ok(())
        }
    }
}

fn check_uinput_access(uinput_device: &Path) -> Result<()> {
    if !uinput_device.exists() {
        return Err(AutofishError::Permission(format!(
            "{} не существует, загрузите модуль: sudo modprobe uinput",
            uinput_device.display()
        )));
    }

    let metadata = fs::metadata(uinput_device).map_err(|e| {
        AutofishError::Permission(format!(
            "Не удалось проверить права доступа к {}: {}",
            uinput_device.display(),
            e
        ))
    })?;

    // Обычно 660 (группа uinput/input) или 666
    let mode = metadata.permissions().mode();
    if mode & 0o006 == 0 && mode & 0o060 == 0 {
        return Err(AutofishError::Permission(format!(
            "Нет прав доступа к {}. Добавьте пользователя в группу 'uinput' или 'input'",
            uinput_device.display()
        )));
    }

    info!("Доступ к {} подтвержден", uinput_device.display());
    Ok(())
}

fn check_not_root() {
    match std::env::var("USER") {
        Ok(user) if user == "root" => {
            warn!("⚠️  Приложение запущено от имени root!");
            warn!("   Для ввода достаточно доступа к /dev/uinput:");
            for command in get_setup_commands().iter().filter(|c| c.starts_with("sudo")) {
                warn!("   {}", command);
            }
        }
        Ok(user) => {
            info!("Приложение запущено от имени пользователя: {}", user);
        }
        Err(_) => {
            warn!("Не удалось определить пользователя");
        }
    }
}

/// Рекомендуемые команды для настройки доступа к uinput
pub fn get_setup_commands() -> Vec<String> {
    vec![
        "# Добавить пользователя в группу input:".to_string(),
        "sudo usermod -a -G input $USER".to_string(),
        "".to_string(),
        "# Загрузить модуль uinput:".to_string(),
        "sudo modprobe uinput".to_string(),
        "".to_string(),
        "# Автоматическая загрузка модуля при загрузке системы:".to_string(),
        "echo 'uinput' | sudo tee /etc/modules-load.d/uinput.conf".to_string(),
        "".to_string(),
        "# После выполнения команд перезайдите в систему".to_string(),
    ]
}
