use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::errors::{BotError, BotResult};
use crate::perception::types::ScreenCoordinate;

pub const DEFAULT_SCREEN_SIZE: (u32, u32) = (1080, 1920);

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Characters the device shell would interpret inside `input text`.
const SHELL_SPECIAL: &[char] = &[
    '\\', '\'', '"', '`', '$', '&', '|', ';', '<', '>', '(', ')', '*', '?', '~', '#', '!', '[', ']', '{', '}',
];

#[derive(Debug, Clone)]
struct Connection {
    serial: String,
    width: u32,
    height: u32,
}

/// Device driven through the `adb` executable.
pub struct AdbDevice {
    adb: String,
    serial: Option<String>,
    network_address: Option<String>,
    screenshot_dir: PathBuf,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl AdbDevice {
    pub fn new(cfg: &DeviceConfig) -> Self {
        Self {
            adb: cfg.adb_path.clone(),
            serial: cfg.serial.clone(),
            network_address: cfg.ip.as_ref().map(|ip| format!("{ip}:{}", cfg.port)),
            screenshot_dir: cfg.screenshot_dir.clone(),
            timeout: Duration::from_secs(cfg.command_timeout_secs),
            connection: Mutex::new(None),
        }
    }

    fn current(&self) -> BotResult<Connection> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| BotError::Device("device not connected".into()))
    }

    async fn run<S: AsRef<str>>(&self, args: &[S]) -> BotResult<Vec<u8>> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        tracing::debug!(adb = %self.adb, ?args, "adb command");

        let child = tokio::process::Command::new(&self.adb)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| BotError::Timeout(format!("adb {} after {:?}", args.join(" "), self.timeout)))?
            .map_err(|e| BotError::Device(format!("cannot run '{}': {e}", self.adb)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::Device(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn shell(&self, serial: &str, command: &[String]) -> BotResult<String> {
        let mut args = vec!["-s".to_string(), serial.to_string(), "shell".to_string()];
        args.extend_from_slice(command);
        let out = self.run(&args).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn pick_serial(&self, devices: &[(String, String)]) -> BotResult<String> {
        let wanted = self.serial.as_ref().or(self.network_address.as_ref());
        let ready = |serial: &str| devices.iter().any(|(s, state)| s == serial && state == "device");

        if let Some(wanted) = wanted {
            if ready(wanted) {
                return Ok(wanted.clone());
            }
            return Err(BotError::Device(format!(
                "device '{wanted}' not found or not authorized (adb devices: {devices:?})"
            )));
        }
        devices
            .iter()
            .find(|(_, state)| state == "device")
            .map(|(serial, _)| serial.clone())
            .ok_or_else(|| {
                BotError::Device(
                    "no devices found; check the USB or wireless connection, that USB debugging is enabled and that the device is authorized".into(),
                )
            })
    }

    fn screenshot_path(&self) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.screenshot_dir.join(format!("screenshot_{millis}.png"))
    }
}

#[async_trait]
impl Device for AdbDevice {
    fn name(&self) -> &str {
        "adb"
    }

    async fn connect(&self) -> BotResult<()> {
        if let Some(addr) = &self.network_address {
            let out = self.run(&["connect", addr.as_str()]).await?;
            let text = String::from_utf8_lossy(&out).to_lowercase();
            if text.contains("failed") || text.contains("unable") || text.contains("cannot") {
                return Err(BotError::Device(format!("adb connect {addr}: {}", text.trim())));
            }
            tracing::info!(address = %addr, "network device connected");
        }

        let listing = self.run(&["devices"]).await?;
        let devices = parse_device_list(&String::from_utf8_lossy(&listing));
        let serial = self.pick_serial(&devices)?;

        let (width, height) = match self.shell(&serial, &["wm".into(), "size".into()]).await {
            Ok(out) => parse_wm_size(&out).unwrap_or_else(|| {
                tracing::warn!(output = %out.trim(), "could not parse screen size, using defaults");
                DEFAULT_SCREEN_SIZE
            }),
            Err(e) => {
                tracing::warn!(error = %e, "screen size query failed, using defaults");
                DEFAULT_SCREEN_SIZE
            }
        };

        tracing::info!(serial = %serial, width, height, "connected to device");
        *self.connection.lock().unwrap_or_else(|p| p.into_inner()) = Some(Connection { serial, width, height });
        Ok(())
    }

    fn disconnect(&self) {
        let previous = self.connection.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(conn) = previous else { return };
        tracing::info!(serial = %conn.serial, "disconnecting from device");

        // Drop may run outside the runtime, so the network disconnect is fire-and-forget.
        if let Some(addr) = &self.network_address {
            let spawned = std::process::Command::new(&self.adb)
                .args(["disconnect", addr.as_str()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            if let Err(e) = spawned {
                tracing::warn!(address = %addr, error = %e, "adb disconnect failed");
            }
        }
    }

    async fn tap(&self, at: ScreenCoordinate) -> BotResult<()> {
        let conn = self.current()?;
        let command = tap_command(at, (conn.width, conn.height));
        self.shell(&conn.serial, &command).await?;
        tracing::debug!(requested = %at, command = ?command, "tapped");
        Ok(())
    }

    async fn swipe(&self, from: ScreenCoordinate, to: ScreenCoordinate, duration_ms: u32) -> BotResult<()> {
        let conn = self.current()?;
        let command = swipe_command(from, to, duration_ms, (conn.width, conn.height));
        self.shell(&conn.serial, &command).await?;
        tracing::debug!(command = ?command, "swiped");
        Ok(())
    }

    async fn input_text(&self, text: &str) -> BotResult<()> {
        let conn = self.current()?;
        for command in input_text_commands(text) {
            self.shell(&conn.serial, &command).await?;
        }
        tracing::debug!(chars = text.chars().count(), "text entered");
        Ok(())
    }

    async fn press_key(&self, keycode: &str) -> BotResult<()> {
        let conn = self.current()?;
        if keycode.is_empty() || !keycode.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BotError::Device(format!("invalid keycode '{keycode}'")));
        }
        let command = vec!["input".to_string(), "keyevent".to_string(), keycode.to_string()];
        self.shell(&conn.serial, &command).await?;
        tracing::debug!(keycode, "key pressed");
        Ok(())
    }

    async fn capture_screenshot(&self, path: Option<&Path>) -> BotResult<PathBuf> {
        let conn = self.current()?;
        let bytes = self
            .run(&["-s", conn.serial.as_str(), "exec-out", "screencap", "-p"])
            .await?;
        if !bytes.starts_with(PNG_MAGIC) {
            return Err(BotError::Device(format!(
                "screencap returned {} bytes that are not a PNG",
                bytes.len()
            )));
        }

        let target = path.map(Path::to_path_buf).unwrap_or_else(|| self.screenshot_path());
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "screenshot saved");
        Ok(target)
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        self.connection
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|c| (c.width, c.height))
            .unwrap_or((0, 0))
    }
}

/// `(serial, state)` pairs from `adb devices`.
pub fn parse_device_list(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            Some((cols.next()?.to_string(), cols.next()?.to_string()))
        })
        .collect()
}

/// Screen size from `wm size`; an override size wins over the physical one.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let find = |label: &str| {
        output.lines().find_map(|line| {
            let rest = line.trim().strip_prefix(label)?;
            let (w, h) = rest.trim().split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
    };
    find("Override size:").or_else(|| find("Physical size:"))
}

/// `input tap` with the point clamped to a `screen` of (width, height).
pub fn tap_command(at: ScreenCoordinate, screen: (u32, u32)) -> Vec<String> {
    let at = at.clamped(screen.0, screen.1);
    vec!["input".into(), "tap".into(), at.x.to_string(), at.y.to_string()]
}

/// `input swipe` with both endpoints clamped to `screen`.
pub fn swipe_command(from: ScreenCoordinate, to: ScreenCoordinate, duration_ms: u32, screen: (u32, u32)) -> Vec<String> {
    let from = from.clamped(screen.0, screen.1);
    let to = to.clamped(screen.0, screen.1);
    vec![
        "input".into(),
        "swipe".into(),
        from.x.to_string(),
        from.y.to_string(),
        to.x.to_string(),
        to.y.to_string(),
        duration_ms.to_string(),
    ]
}

/// `input text` commands that type `text` verbatim.
///
/// Any whitespace becomes `%s` (the device's space) and other control characters
/// are dropped, so nothing can end the shell command line. `input text` turns every
/// `%s` into a space; a literal `%` followed by `s` is therefore typed by two
/// commands, split between the two characters.
pub fn input_text_commands(text: &str) -> Vec<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == 's' && current.ends_with('%') {
            segments.push(std::mem::take(&mut current));
        }
        match c {
            c if c.is_whitespace() => current.push_str("%s"),
            c if c.is_control() => {}
            c if SHELL_SPECIAL.contains(&c) => {
                current.push('\\');
                current.push(c);
            }
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| vec!["input".into(), "text".into(), s])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_list_parsing() {
        let out = "* daemon started successfully\nList of devices attached\nemulator-5554\tdevice\n192.168.1.5:5555\tunauthorized\n\n";
        assert_eq!(
            parse_device_list(out),
            vec![
                ("emulator-5554".to_string(), "device".to_string()),
                ("192.168.1.5:5555".to_string(), "unauthorized".to_string()),
            ]
        );
        assert!(parse_device_list("List of devices attached\n").is_empty());
    }

    #[test]
    fn wm_size_parsing() {
        assert_eq!(parse_wm_size("Physical size: 1440x3120\n"), Some((1440, 3120)));
        assert_eq!(
            parse_wm_size("Physical size: 1440x3120\nOverride size: 1080x2340\n"),
            Some((1080, 2340))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    /// The typed argument of every `input text` command.
    fn typed(text: &str) -> Vec<String> {
        input_text_commands(text)
            .into_iter()
            .map(|cmd| {
                assert_eq!(&cmd[..2], ["input", "text"]);
                cmd[2].clone()
            })
            .collect()
    }

    #[test]
    fn text_escaping() {
        assert_eq!(typed("Hey there!"), vec!["Hey%sthere\\!"]);
        assert_eq!(typed("it's $5 (ok)"), vec!["it\\'s%s\\$5%s\\(ok\\)"]);
        assert_eq!(typed("plain"), vec!["plain"]);
        assert!(typed("").is_empty());
    }

    #[test]
    fn line_breaks_and_tabs_never_reach_the_shell() {
        assert_eq!(typed("Nice trail!\nreboot"), vec!["Nice%strail\\!%sreboot"]);
        assert_eq!(typed("hi\tthere\r\n"), vec!["hi%sthere%s%s"]);
        assert_eq!(typed("a\u{7}b"), vec!["ab"]);
        for arg in typed("x\n\r\t\u{0}y") {
            assert!(!arg.chars().any(char::is_control));
        }
    }

    #[test]
    fn literal_percent_s_is_split() {
        assert_eq!(typed("50%sale"), vec!["50%", "sale"]);
        assert_eq!(typed("100% sure"), vec!["100%%ssure"]);
        assert_eq!(typed("%"), vec!["%"]);
        assert_eq!(typed("%%s"), vec!["%%", "s"]);
    }

    #[test]
    fn commands_clamp_to_screen() {
        assert_eq!(
            tap_command(ScreenCoordinate::new(10, 20), (1080, 1920)),
            vec!["input", "tap", "10", "20"]
        );
        assert_eq!(
            tap_command(ScreenCoordinate::new(5000, -20), (1080, 1920)),
            vec!["input", "tap", "1079", "0"]
        );
        assert_eq!(
            swipe_command(ScreenCoordinate::new(864, 960), ScreenCoordinate::new(-5, 4000), 300, (1080, 1920)),
            vec!["input", "swipe", "864", "960", "0", "1919", "300"]
        );
    }

    fn device(serial: Option<&str>) -> AdbDevice {
        let mut cfg = DeviceConfig::default();
        cfg.serial = serial.map(String::from);
        AdbDevice::new(&cfg)
    }

    #[test]
    fn serial_selection() {
        let devices = vec![
            ("a".to_string(), "offline".to_string()),
            ("b".to_string(), "device".to_string()),
        ];
        assert_eq!(device(None).pick_serial(&devices).unwrap(), "b");
        assert_eq!(device(Some("b")).pick_serial(&devices).unwrap(), "b");
        assert!(device(Some("a")).pick_serial(&devices).is_err());
        assert!(device(None).pick_serial(&[]).is_err());
    }

    #[tokio::test]
    async fn commands_need_a_connection() {
        let dev = device(None);
        assert_eq!(dev.screen_dimensions(), (0, 0));
        assert!(matches!(
            dev.tap(ScreenCoordinate::new(1, 1)).await,
            Err(BotError::Device(_))
        ));
        dev.disconnect();
    }
}
