//! Platform Adapter — OS/shell detection and canonical-verb → invocation
//! lookup, consulted only to phrase correction suggestions. Never executes
//! anything itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsClass {
    Linux,
    MacOs,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellClass {
    Posix,
    PowerShell,
    Cmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    ListFiles,
    Copy,
    Remove,
    MakeDirectory,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: OsClass,
    pub shell: ShellClass,
}

impl Platform {
    /// Detect the current process's OS class and a best-guess shell class
    /// from `$SHELL` / `$ComSpec`-style environment signals. This is the one
    /// place in the crate permitted to read OS-identifying environment
    /// state, since it is platform metadata, not session configuration.
    pub fn detect() -> Self {
        let os = if cfg!(target_os = "windows") {
            OsClass::Windows
        } else if cfg!(target_os = "macos") {
            OsClass::MacOs
        } else {
            OsClass::Linux
        };

        let shell = match os {
            OsClass::Windows => {
                if std::env::var("PSModulePath").is_ok() {
                    ShellClass::PowerShell
                } else {
                    ShellClass::Cmd
                }
            }
            OsClass::Linux | OsClass::MacOs => ShellClass::Posix,
        };

        Self { os, shell }
    }

    /// The exact invocation for `verb` on this platform's detected shell.
    pub fn command_for(&self, verb: Verb) -> &'static str {
        match (self.shell, verb) {
            (ShellClass::Posix, Verb::ListFiles) => "ls -la",
            (ShellClass::Posix, Verb::Copy) => "cp",
            (ShellClass::Posix, Verb::Remove) => "rm -rf",
            (ShellClass::Posix, Verb::MakeDirectory) => "mkdir -p",
            (ShellClass::Posix, Verb::Move) => "mv",

            (ShellClass::PowerShell, Verb::ListFiles) => "Get-ChildItem",
            (ShellClass::PowerShell, Verb::Copy) => "Copy-Item -Recurse",
            (ShellClass::PowerShell, Verb::Remove) => "Remove-Item -Recurse -Force",
            (ShellClass::PowerShell, Verb::MakeDirectory) => "New-Item -ItemType Directory -Force",
            (ShellClass::PowerShell, Verb::Move) => "Move-Item",

            (ShellClass::Cmd, Verb::ListFiles) => "dir",
            (ShellClass::Cmd, Verb::Copy) => "xcopy /E /I",
            (ShellClass::Cmd, Verb::Remove) => "rmdir /S /Q",
            (ShellClass::Cmd, Verb::MakeDirectory) => "mkdir",
            (ShellClass::Cmd, Verb::Move) => "move",
        }
    }

    /// Phrase a correction suggestion: "did you mean `<command>`?" for the
    /// verb implied by a failing command the host reported.
    pub fn suggest(&self, verb: Verb) -> String {
        format!("on this platform, try: {}", self.command_for(verb))
    }
}
