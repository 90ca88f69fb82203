use crate::autofish_error;
use crate::error::Result;
use crate::services::keycode_map::KeycodeMap;
use evdev::uinput::{VirtualDevice as UinputDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AbsoluteAxisCode, AttributeSet, EventType, InputEvent, KeyCode, UinputAbsSetup};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};

const KEY_RELEASED: i32 = 0;
const KEY_PRESSED: i32 = 1;

/// Виртуальное устройство ввода (uinput): клавиатура и абсолютный указатель.
///
/// Все операции возвращают `bool` и не паникуют: реакция, которая не смогла
/// нажать клавишу, не должна ронять наблюдатель.
pub struct VirtualDevice {
    device: Option<Mutex<UinputDevice>>,
    device_name: String,
    dry_run: bool,
    held_keys: Mutex<HashSet<KeyCode>>,
}

impl VirtualDevice {
    pub fn new(device_name: &str, screen_size: (u32, u32), dry_run: bool) -> Result<Self> {
        info!("Инициализация VirtualDevice '{}' (dry_run: {})", device_name, dry_run);

        let device = if dry_run {
            None
        } else {
            Some(Mutex::new(Self::create_virtual_device(device_name, screen_size)?))
        };

        Ok(Self {
            device,
            device_name: device_name.to_string(),
            dry_run,
            held_keys: Mutex::new(HashSet::new()),
        })
    }

    fn create_virtual_device(device_name: &str, (width, height): (u32, u32)) -> Result<UinputDevice> {
        info!(
            "Создание виртуального устройства uinput '{}' (экран {}x{})",
            device_name, width, height
        );

        let mut keys = AttributeSet::<KeyCode>::new();
        for code in KeycodeMap::all_codes() {
            keys.insert(code);
        }

        let max_x = i32::try_from(width.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height.saturating_sub(1)).unwrap_or(i32::MAX);
        let abs_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, AbsInfo::new(0, 0, max_x, 0, 0, 1));
        let abs_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, AbsInfo::new(0, 0, max_y, 0, 0, 1));

        #[allow(deprecated)]
        let builder = VirtualDeviceBuilder::new()?;
        let device = builder
            .name(device_name)
            .with_keys(&keys)?
            .with_absolute_axis(&abs_x)?
            .with_absolute_axis(&abs_y)?
            .build()
            .map_err(|e| autofish_error!(input, "Не удалось создать виртуальное устройство '{}': {}", device_name, e))?;

        info!("Виртуальное устройство '{}' создано успешно", device_name);
        Ok(device)
    }

    pub fn name(&self) -> &str {
        &self.device_name
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn emit(&self, events: &[InputEvent]) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| autofish_error!(input, "Виртуальное устройство недоступно"))?;

        // emit сам дописывает SYN_REPORT в конец пачки
        device
            .lock()
            .emit(events)
            .map_err(|e| autofish_error!(input, "Не удалось отправить события: {}", e))
    }

    fn key_event(code: KeyCode, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY.0, code.code(), value)
    }

    fn set_key(&self, key: &str, value: i32) -> bool {
        let code = match KeycodeMap::resolve(key) {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };

        if self.dry_run {
            info!(
                "[DRY RUN] {} '{}'",
                if value == KEY_PRESSED { "Нажатие" } else { "Отпускание" },
                key
            );
            return true;
        }

        match self.emit(&[Self::key_event(code, value)]) {
            Ok(()) => {
                let mut held = self.held_keys.lock();
                if value == KEY_PRESSED {
                    held.insert(code);
                } else {
                    held.remove(&code);
                }
                debug!("Клавиша '{}' -> {}", key, value);
                true
            }
            Err(e) => {
                error!("Клавиша '{}': {}", key, e);
                false
            }
        }
    }

    pub fn key_down(&self, key: &str) -> bool {
        self.set_key(key, KEY_PRESSED)
    }

    pub fn key_up(&self, key: &str) -> bool {
        self.set_key(key, KEY_RELEASED)
    }

    /// Нажать и отпустить клавишу. Блокирует вызывающий поток на время удержания.
    pub fn press(&self, key: &str, hold: Duration) -> bool {
        if !self.key_down(key) {
            return false;
        }
        if !hold.is_zero() && !self.dry_run {
            std::thread::sleep(hold);
        }
        self.key_up(key)
    }

    /// Переместить указатель в точку экрана и кликнуть левой кнопкой
    pub fn click(&self, x: i32, y: i32) -> bool {
        self.click_button(x, y, "mouse_left")
    }

    pub fn click_button(&self, x: i32, y: i32, button: &str) -> bool {
        let code = match KeycodeMap::resolve(button) {
            Ok(code) if KeycodeMap::is_mouse_button(code) => code,
            Ok(_) => {
                error!("'{}' не является кнопкой мыши", button);
                return false;
            }
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };

        if self.dry_run {
            info!("[DRY RUN] Клик {} в ({}, {})", button, x, y);
            return true;
        }

        let moved = self.emit(&[
            InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_X.0, x),
            InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_Y.0, y),
        ]);
        let clicked = moved.and_then(|()| {
            self.emit(&[Self::key_event(code, KEY_PRESSED)])?;
            self.emit(&[Self::key_event(code, KEY_RELEASED)])
        });

        match clicked {
            Ok(()) => {
                debug!("Клик {} в ({}, {})", button, x, y);
                true
            }
            Err(e) => {
                error!("Клик в ({}, {}) не удался: {}", x, y, e);
                false
            }
        }
    }

    /// Отпустить все удерживаемые клавиши (при завершении работы)
    pub fn release_all_keys(&self) -> Result<()> {
        let held: Vec<KeyCode> = self.held_keys.lock().drain().collect();
        if held.is_empty() || self.dry_run {
            return Ok(());
        }

        let names: Vec<&str> = held
            .iter()
            .map(|code| KeycodeMap::get_key_name(code.code()).unwrap_or("?"))
            .collect();
        info!("Отпускание удерживаемых клавиш: {}", names.join(", "));
        let events: Vec<InputEvent> = held
            .into_iter()
            .map(|code| Self::key_event(code, KEY_RELEASED))
            .collect();
        self.emit(&events)
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release_all_keys() {
            error!("Не удалось отпустить клавиши при закрытии: {}", e);
        }
        if !self.dry_run {
            info!("Закрытие виртуального устройства '{}'", self.device_name);
        }
    }
}
