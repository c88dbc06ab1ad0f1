use std::io::Write;
use std::process::{Command, Output, Stdio};

use super::{ClipboardError, ClipboardStrategy};

const NAME: &str = "command";

/// How the text to copy reaches the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Stdin,
    /// Appended to the last argument as a single-quoted PowerShell string.
    PowerShellValue,
}

/// One command-line clipboard utility.
#[derive(Debug, Clone)]
pub struct ClipboardTool {
    pub program: String,
    pub read_args: Vec<String>,
    pub write_args: Vec<String>,
    /// `None` clears by writing an empty string.
    pub clear_args: Option<Vec<String>>,
    pub input: InputMode,
    pub trim_trailing_newline: bool,
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl ClipboardTool {
    pub fn powershell() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            read_args: args(&[
                "-NoProfile",
                "-Command",
                "[Console]::OutputEncoding=[Text.Encoding]::UTF8; Get-Clipboard -Raw",
            ]),
            write_args: args(&["-NoProfile", "-Command", "Set-Clipboard -Value "]),
            clear_args: Some(args(&["-NoProfile", "-Command", "Set-Clipboard -Value ''"])),
            input: InputMode::PowerShellValue,
            trim_trailing_newline: true,
        }
    }

    pub fn pasteboard() -> Self {
        Self {
            program: "pbpaste".to_string(),
            read_args: Vec::new(),
            write_args: Vec::new(),
            clear_args: None,
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        }
    }

    pub fn wl_clipboard() -> Self {
        Self {
            program: "wl-paste".to_string(),
            read_args: args(&["--no-newline"]),
            write_args: Vec::new(),
            clear_args: Some(args(&["--clear"])),
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        }
    }

    pub fn xclip() -> Self {
        Self {
            program: "xclip".to_string(),
            read_args: args(&["-selection", "clipboard", "-o"]),
            write_args: args(&["-selection", "clipboard"]),
            clear_args: None,
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        }
    }

    pub fn xsel() -> Self {
        Self {
            program: "xsel".to_string(),
            read_args: args(&["--clipboard", "--output"]),
            write_args: args(&["--clipboard", "--input"]),
            clear_args: Some(args(&["--clipboard", "--delete"])),
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        }
    }

    /// Reader and writer are separate binaries for pbpaste/pbcopy and
    /// wl-paste/wl-copy.
    fn writer(&self) -> &str {
        match self.program.as_str() {
            "pbpaste" => "pbcopy",
            "wl-paste" => "wl-copy",
            other => other,
        }
    }

    fn read(&self) -> Result<Option<String>, ClipboardError> {
        let output = capture(command(&self.program, &self.read_args), &self.program)?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if self.trim_trailing_newline {
            let trimmed = text.trim_end_matches(['\r', '\n']).len();
            text.truncate(trimmed);
        }
        Ok((!text.is_empty()).then_some(text))
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        let program = self.writer();
        match self.input {
            InputMode::Stdin => execute(command(program, &self.write_args), Some(text), program),
            InputMode::PowerShellValue => {
                let mut write_args = self.write_args.clone();
                if let Some(script) = write_args.last_mut() {
                    script.push_str(&powershell_quote(text));
                }
                execute(command(program, &write_args), None, program)
            }
        }
    }

    fn clear(&self) -> Result<(), ClipboardError> {
        match &self.clear_args {
            Some(clear_args) => {
                let program = self.writer();
                execute(command(program, clear_args), None, program)
            }
            None => self.write(""),
        }
    }
}

/// Single-quoted PowerShell literal; nothing inside is interpolated.
pub fn powershell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn command(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

fn failure(program: &str, message: impl ToString) -> ClipboardError {
    ClipboardError::Command {
        program: program.to_string(),
        message: message.to_string(),
    }
}

/// Runs a read command and collects its output.
fn capture(mut cmd: Command, program: &str) -> Result<Output, ClipboardError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| failure(program, e))?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(failure(
            program,
            format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

/// Runs a write or clear command and waits for its exit status only.
///
/// xclip and wl-copy fork a child that owns the selection until another
/// app takes it. That child inherits stdout and stderr, so they must not
/// be pipes we read to EOF.
fn execute(mut cmd: Command, stdin: Option<&str>, program: &str) -> Result<(), ClipboardError> {
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|e| failure(program, e))?;
    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let written = pipe.write_all(input.as_bytes());
            drop(pipe);
            if let Err(e) = written {
                let _ = child.kill();
                let _ = child.wait();
                return Err(failure(program, e));
            }
        }
    }

    let status = child.wait().map_err(|e| failure(program, e))?;
    if status.success() {
        Ok(())
    } else {
        Err(failure(program, format!("exited with {}", status)))
    }
}

/// Shells out to the platform clipboard utility, trying each known tool
/// until one runs.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    tools: Vec<ClipboardTool>,
}

impl CommandClipboard {
    pub fn new(tools: Vec<ClipboardTool>) -> Self {
        Self { tools }
    }

    pub fn platform() -> Self {
        let tools = if cfg!(windows) {
            vec![ClipboardTool::powershell()]
        } else if cfg!(target_os = "macos") {
            vec![ClipboardTool::pasteboard()]
        } else {
            vec![
                ClipboardTool::wl_clipboard(),
                ClipboardTool::xclip(),
                ClipboardTool::xsel(),
            ]
        };
        Self::new(tools)
    }

    fn first_ok<T>(
        &self,
        op: impl Fn(&ClipboardTool) -> Result<T, ClipboardError>,
    ) -> Result<T, ClipboardError> {
        let mut last_err = ClipboardError::Unsupported(NAME);
        for tool in &self.tools {
            match op(tool) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::debug!("{}", e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

impl ClipboardStrategy for CommandClipboard {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&self) -> Result<Option<String>, ClipboardError> {
        self.first_ok(ClipboardTool::read)
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        self.first_ok(|tool| tool.write(text))
    }

    fn clear(&self) -> Result<(), ClipboardError> {
        self.first_ok(ClipboardTool::clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powershell_quoting_doubles_single_quotes() {
        assert_eq!(powershell_quote("plain"), "'plain'");
        assert_eq!(powershell_quote("it's $HOME"), "'it''s $HOME'");
    }

    #[test]
    fn paired_tools_write_with_their_counterpart() {
        assert_eq!(ClipboardTool::pasteboard().writer(), "pbcopy");
        assert_eq!(ClipboardTool::wl_clipboard().writer(), "wl-copy");
        assert_eq!(ClipboardTool::xclip().writer(), "xclip");
    }

    #[test]
    fn no_tools_means_unsupported() {
        let clipboard = CommandClipboard::new(Vec::new());
        assert!(matches!(
            clipboard.read(),
            Err(ClipboardError::Unsupported(_))
        ));
    }

    #[test]
    fn missing_program_is_reported_and_skipped() {
        let missing = ClipboardTool {
            program: "definitely-not-a-clipboard-tool".to_string(),
            ..ClipboardTool::xclip()
        };
        let clipboard = CommandClipboard::new(vec![missing]);
        assert!(matches!(
            clipboard.write("x"),
            Err(ClipboardError::Command { .. })
        ));
    }

    #[test]
    fn powershell_reads_clipboard_as_utf8() {
        let tool = ClipboardTool::powershell();
        let script = tool.read_args.last().unwrap();
        assert!(script.starts_with("[Console]::OutputEncoding=[Text.Encoding]::UTF8;"));
        assert!(script.ends_with("Get-Clipboard -Raw"));
    }

    /// Writer that forks a child holding stdout open, like xclip keeping
    /// the selection alive.
    #[cfg(unix)]
    #[test]
    fn forking_writer_does_not_block_write_or_clear() {
        let tool = ClipboardTool {
            program: "sh".to_string(),
            read_args: args(&["-c", "true"]),
            write_args: args(&["-c", "cat >/dev/null; sleep 4 &"]),
            clear_args: None,
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        };
        let clipboard = CommandClipboard::new(vec![tool]);

        let started = std::time::Instant::now();
        clipboard.write("rewritten").unwrap();
        clipboard.clear().unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn failing_writer_reports_exit_status() {
        let tool = ClipboardTool {
            program: "sh".to_string(),
            read_args: args(&["-c", "true"]),
            write_args: args(&["-c", "cat >/dev/null; exit 3"]),
            clear_args: None,
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        };
        let clipboard = CommandClipboard::new(vec![tool]);

        assert!(matches!(
            clipboard.write("x"),
            Err(ClipboardError::Command { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn shell_backed_tool_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("board");
        let path = file.display().to_string();
        let tool = ClipboardTool {
            program: "sh".to_string(),
            read_args: args(&["-c", &format!("cat '{}' 2>/dev/null || true", path)]),
            write_args: args(&["-c", &format!("cat > '{}'", path)]),
            clear_args: None,
            input: InputMode::Stdin,
            trim_trailing_newline: false,
        };
        let clipboard = CommandClipboard::new(vec![tool]);

        assert_eq!(clipboard.read().unwrap(), None);
        clipboard.write("line one\nline two").unwrap();
        assert_eq!(
            clipboard.read().unwrap().as_deref(),
            Some("line one\nline two")
        );
        clipboard.clear().unwrap();
        assert_eq!(clipboard.read().unwrap(), None);
    }
}
