//! Console script language.
//!
//! One statement per line. A statement is a call, `name(arg, ...)`, where
//! `name` may be dotted (`sys.exit`) and each argument is an integer, a
//! quoted string, or `None`. A bare name is a call with no arguments.
//! Blank lines and `#` comments are skipped. Notebook files group lines
//! into cells separated by `# %%` markers.

use std::sync::OnceLock;

use console_guard_core::{ExitArg, GuardError, Result};
use regex::Regex;

/// Marker line starting a new notebook cell.
pub const CELL_MARKER: &str = "# %%";

/// A literal argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Str(String),
    None,
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Str(s) => write!(f, "{}", s),
            Literal::None => write!(f, "None"),
        }
    }
}

/// A parsed call statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// 1-based source line
    pub line: usize,
    pub target: String,
    pub args: Vec<Literal>,
}

impl Call {
    /// Interpret the arguments as the argument of a termination call.
    pub fn exit_arg(&self) -> Result<ExitArg> {
        match self.args.as_slice() {
            [] | [Literal::None] => Ok(ExitArg::None),
            [Literal::Int(n)] => i32::try_from(*n)
                .map(ExitArg::Code)
                .map_err(|_| self.error(format!("exit status out of range: {}", n))),
            [Literal::Str(s)] => Ok(ExitArg::Message(s.clone())),
            _ => Err(self.error(format!(
                "{}() takes at most 1 argument ({} given)",
                self.target,
                self.args.len()
            ))),
        }
    }

    /// The argument at `index`, which must be a string.
    pub fn str_arg(&self, index: usize) -> Result<&str> {
        match self.args.get(index) {
            Some(Literal::Str(s)) => Ok(s),
            Some(other) => Err(self.error(format!(
                "{}() argument {} must be a string, not {}",
                self.target,
                index + 1,
                other
            ))),
            None => Err(self.error(format!(
                "{}() missing required argument {}",
                self.target,
                index + 1
            ))),
        }
    }

    /// Arguments after `index`, rendered as strings.
    pub fn rest_args(&self, index: usize) -> Vec<String> {
        self.args.iter().skip(index).map(|a| a.to_string()).collect()
    }

    pub fn error(&self, message: impl Into<String>) -> GuardError {
        GuardError::ScriptError {
            line: self.line,
            message: message.into(),
        }
    }
}

fn call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*(?:\((?P<args>.*)\))?$",
        )
        .expect("call pattern is valid")
    })
}

/// Parse one line. Returns `None` for blank lines and comments.
pub fn parse_line(line: usize, text: &str) -> Result<Option<Call>> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }
    let err = |message: String| GuardError::ScriptError { line, message };

    let captures = call_pattern()
        .captures(text)
        .ok_or_else(|| err(format!("invalid syntax: {}", text)))?;
    let target = captures["name"].to_string();
    let args = match captures.name("args") {
        Some(raw) => split_args(raw.as_str())
            .map_err(err)?
            .iter()
            .map(|a| parse_literal(a).map_err(err))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(Some(Call { line, target, args }))
}

/// Parse a whole script.
pub fn parse_script(source: &str) -> Result<Vec<Call>> {
    let mut calls = Vec::new();
    for (index, text) in source.lines().enumerate() {
        if let Some(call) = parse_line(index + 1, text)? {
            calls.push(call);
        }
    }
    Ok(calls)
}

/// Parse a notebook into cells. Lines before the first marker form a cell
/// of their own if they contain any statement.
pub fn parse_notebook(source: &str) -> Result<Vec<Vec<Call>>> {
    let mut cells = vec![Vec::new()];
    for (index, text) in source.lines().enumerate() {
        if text.trim_start().starts_with(CELL_MARKER) {
            cells.push(Vec::new());
            continue;
        }
        if let Some(call) = parse_line(index + 1, text)? {
            if let Some(cell) = cells.last_mut() {
                cell.push(call);
            }
        }
    }
    cells.retain(|cell| !cell.is_empty());
    Ok(cells)
}

/// Split an argument list on top-level commas, keeping quoted text intact.
fn split_args(raw: &str) -> std::result::Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in raw.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => args.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current);
    }
    Ok(args.into_iter().map(|a| a.trim().to_string()).collect())
}

fn parse_literal(raw: &str) -> std::result::Result<Literal, String> {
    if raw.is_empty() {
        return Err("empty argument".to_string());
    }
    if raw == "None" {
        return Ok(Literal::None);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Literal::Int(n));
    }
    let mut chars = raw.chars();
    match (chars.next(), raw.chars().last()) {
        (Some(open @ ('"' | '\'')), Some(close)) if open == close && raw.len() >= 2 => {
            let body = &raw[1..raw.len() - 1];
            if !is_single_string(body, open) {
                return Err(format!("unsupported argument: {}", raw));
            }
            Ok(Literal::Str(unescape(body)))
        }
        _ => Err(format!("unsupported argument: {}", raw)),
    }
}

/// The body of a quoted literal must not close its quote before the end.
fn is_single_string(body: &str, quote: char) -> bool {
    let mut escaped = false;
    for c in body.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == quote => return false,
            _ => {}
        }
    }
    !escaped
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_int() {
        let call = parse_line(1, "sys.exit(3)").unwrap().unwrap();
        assert_eq!(call.target, "sys.exit");
        assert_eq!(call.args, vec![Literal::Int(3)]);
        assert_eq!(call.exit_arg().unwrap(), ExitArg::Code(3));
    }

    #[test]
    fn test_bare_name_is_call() {
        let call = parse_line(4, "  quit  ").unwrap().unwrap();
        assert_eq!(call.target, "quit");
        assert!(call.args.is_empty());
        assert_eq!(call.line, 4);
        assert_eq!(call.exit_arg().unwrap(), ExitArg::None);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        assert!(parse_line(1, "").unwrap().is_none());
        assert!(parse_line(1, "   # note").unwrap().is_none());
    }

    #[test]
    fn test_string_args_with_commas() {
        let call = parse_line(1, r#"print("a, b", 'c\'d', None, -2)"#).unwrap().unwrap();
        assert_eq!(
            call.args,
            vec![
                Literal::Str("a, b".to_string()),
                Literal::Str("c'd".to_string()),
                Literal::None,
                Literal::Int(-2),
            ]
        );
    }

    #[test]
    fn test_empty_arg_list() {
        let call = parse_line(1, "exit()").unwrap().unwrap();
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_invalid_syntax() {
        let err = parse_line(2, "exit(3").unwrap_err();
        assert!(matches!(err, GuardError::ScriptError { line: 2, .. }));
        assert!(parse_line(1, "print(\"open)").is_err());
        assert!(parse_line(1, "print(1,,2)").is_err());
        assert!(parse_line(1, "print(bare)").is_err());
    }

    #[test]
    fn test_adjacent_strings_are_rejected() {
        let err = parse_line(1, r#"print("a" "b")"#).unwrap_err();
        assert!(err.to_string().contains("unsupported argument"));
        assert!(parse_line(1, r#"print('a' + 'b')"#).is_err());
        assert!(parse_line(1, r#"print("ends in \")"#).is_err());

        let call = parse_line(1, r#"print("say \"hi\"")"#).unwrap().unwrap();
        assert_eq!(call.args, vec![Literal::Str("say \"hi\"".to_string())]);
    }

    #[test]
    fn test_exit_arg_message_and_arity() {
        let call = parse_line(1, "sys.exit('bye')").unwrap().unwrap();
        assert_eq!(call.exit_arg().unwrap(), ExitArg::Message("bye".to_string()));

        let call = parse_line(1, "exit(1, 2)").unwrap().unwrap();
        assert!(call.exit_arg().is_err());

        let call = parse_line(1, "exit(99999999999)").unwrap().unwrap();
        assert!(call.exit_arg().is_err());
    }

    #[test]
    fn test_parse_script_line_numbers() {
        let calls = parse_script("# header\nprint('a')\n\nexit(2)\n").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].line, 2);
        assert_eq!(calls[1].line, 4);
    }

    #[test]
    fn test_parse_notebook_cells() {
        let source = "print(1)\n# %%\nprint(2)\nprint(3)\n# %% second\n# %%\nprint(4)\n";
        let cells = parse_notebook(source).unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[1].len(), 2);
        assert_eq!(cells[2][0].line, 7);
    }

    #[test]
    fn test_str_arg_errors() {
        let call = parse_line(1, "run(3)").unwrap().unwrap();
        assert!(call.str_arg(0).is_err());
        let call = parse_line(1, "run()").unwrap().unwrap();
        assert!(call.str_arg(0).is_err());
        let call = parse_line(1, "run('a.gs', 1, 'x')").unwrap().unwrap();
        assert_eq!(call.str_arg(0).unwrap(), "a.gs");
        assert_eq!(call.rest_args(1), vec!["1", "x"]);
    }
}
