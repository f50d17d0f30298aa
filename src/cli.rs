use anyhow::{Result, bail};

use crate::model::ThemePreset;

pub const HELP: &str = "\
书架: list | add <链接> | remove <序号|id> | search <关键字> | open <序号|id> | report
阅读: n(next) | p(prev) | retry | d(down) | u(up) | goto <行> | tap | auto | explain <文字> | c(close) | back
设置: theme <light|sepia|dark|midnight> | font <12-32> | family <sans-serif|serif|monospace> | speed <1-10> | autoscroll <on|off>
账户: signin | signout
其他: help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Add(String),
    Remove(String),
    Search(String),
    Open(String),
    Report,
    Next,
    Prev,
    Retry,
    Down,
    Up,
    Goto(f64),
    Tap,
    Auto,
    Explain(String),
    Close,
    Back,
    Theme(ThemePreset),
    Font(u32),
    Family(String),
    Speed(u8),
    AutoScroll(bool),
    SignIn,
    SignOut,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        let command = match word.to_lowercase().as_str() {
            "list" | "ls" => Self::List,
            "add" => Self::Add(required(rest, "链接")?),
            "remove" | "rm" => Self::Remove(required(rest, "序号或 id")?),
            "search" => Self::Search(rest.to_string()),
            "open" => Self::Open(required(rest, "序号或 id")?),
            "report" => Self::Report,
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Prev,
            "retry" => Self::Retry,
            "d" | "down" => Self::Down,
            "u" | "up" => Self::Up,
            "goto" => {
                let line: f64 = required(rest, "行号")?.parse()?;
                if !line.is_finite() {
                    bail!("行号必须是有限数字: {}", rest);
                }
                Self::Goto(line)
            }
            "tap" => Self::Tap,
            "auto" => Self::Auto,
            "explain" => Self::Explain(required(rest, "要解释的文字")?),
            "close" | "c" => Self::Close,
            "back" | "b" => Self::Back,
            "theme" => match ThemePreset::from_name(rest) {
                Some(preset) => Self::Theme(preset),
                None => bail!("未知主题: {}", rest),
            },
            "font" => Self::Font(required(rest, "字号")?.parse()?),
            "family" => Self::Family(required(rest, "字体")?),
            "speed" => Self::Speed(required(rest, "速度")?.parse()?),
            "autoscroll" => match rest.to_lowercase().as_str() {
                "on" => Self::AutoScroll(true),
                "off" => Self::AutoScroll(false),
                _ => bail!("用法: autoscroll <on|off>"),
            },
            "signin" => Self::SignIn,
            "signout" => Self::SignOut,
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => bail!("未知命令: {}，输入 help 查看帮助", other),
        };
        Ok(Some(command))
    }
}

fn required(rest: &str, what: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("缺少参数: {}", what);
    }
    Ok(rest.to_string())
}
