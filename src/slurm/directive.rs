use std::fmt;

use serde::Deserialize;

/// Prefix sbatch looks for at the start of a header line
pub const MARKER: &str = "#SBATCH";

/// GPU generic resource request, e.g. `gpu:1` or `gpu:a100:2`
pub const GPU: &str = "gres";
/// Memory ceiling per node, e.g. `64G`
pub const MEMORY: &str = "mem";
/// Standard output log path
pub const OUTPUT: &str = "output";
/// Standard error log path
pub const ERROR: &str = "error";
/// Exclusive node allocation (flag, no value)
pub const EXCLUSIVE: &str = "exclusive";

/// A single resource directive
///
/// Keys are long option names without the leading dashes. Values are opaque: they are handed to
/// the scheduler exactly as written, the only requirement is that they stay on one header line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Directive {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Directive {
    pub fn new(key: &str, value: Option<&str>, enabled: bool) -> Directive {
        Directive {
            key: key.to_string(),
            value: value.map(str::to_string),
            enabled,
        }
    }

    /// A control character would end the header line early and leak into the script body
    pub fn fits_on_one_line(&self) -> bool {
        let has_control = |s: &str| s.chars().any(char::is_control);
        !has_control(&self.key) && !self.value.as_deref().map_or(false, has_control)
    }

    /// Paths the scheduler redirects job stdout / stderr to
    pub fn is_log_path(&self) -> bool {
        self.key == OUTPUT || self.key == ERROR
    }

    /// Parse the text following the directive marker, e.g. `--mem=32G` or `-o logs/out.txt`
    pub fn parse_option(text: &str, enabled: bool) -> Result<Directive, String> {
        let text = strip_trailing_comment(text).trim();
        if text.is_empty() {
            return Err("directive marker without an option".to_string());
        }

        if let Some(long) = text.strip_prefix("--") {
            let (key, value) = match long.split_once('=') {
                Some((key, value)) => (key, Some(value.trim())),
                None => match long.split_once(char::is_whitespace) {
                    Some((key, value)) => (key, Some(value.trim())),
                    None => (long, None),
                },
            };
            if key.is_empty() {
                return Err(format!("missing option name in '{text}'"));
            }
            return Ok(Directive::new(key, value, enabled));
        }

        if let Some(short) = text.strip_prefix('-') {
            let mut chars = short.chars();
            let letter = match chars.next() {
                Some(c) if c.is_ascii_alphabetic() => c,
                _ => return Err(format!("missing option name in '{text}'")),
            };
            let rest = chars.as_str().trim();
            let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
            let value = if rest.is_empty() { None } else { Some(rest) };
            let key = long_name(letter).map(str::to_string).unwrap_or_else(|| letter.to_string());
            return Ok(Directive::new(&key, value, enabled));
        }

        Err(format!("expected an option starting with '-', found '{text}'"))
    }
}

/// Directives render the way sbatch reads them, inert ones carry an extra `#`
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.enabled {
            write!(f, "#")?;
        }
        match &self.value {
            Some(value) => write!(f, "{MARKER} --{}={}", self.key, value),
            None => write!(f, "{MARKER} --{}", self.key),
        }
    }
}

/// Long option names for the sbatch short options seen in job headers
fn long_name(letter: char) -> Option<&'static str> {
    match letter {
        'o' => Some(OUTPUT),
        'e' => Some(ERROR),
        'G' => Some("gpus"),
        'J' => Some("job-name"),
        't' => Some("time"),
        'p' => Some("partition"),
        'N' => Some("nodes"),
        'n' => Some("ntasks"),
        'c' => Some("cpus-per-task"),
        'A' => Some("account"),
        _ => None,
    }
}

/// Drop a ` # comment` after the option, ignoring `#` inside quotes
fn strip_trailing_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut previous = ' ';
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '#') if previous.is_whitespace() => return &text[..i],
            _ => {}
        }
        previous = c;
    }
    text
}
