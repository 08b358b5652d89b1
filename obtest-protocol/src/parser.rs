use winnow::ModalResult;
use winnow::ascii::space0;
use winnow::combinator::opt;
use winnow::prelude::*;
use winnow::token::{rest, take_till};

pub const COMMENT_PREFIX: char = '#';
pub const COMMAND_PREFIX: &str = "--";

/// One line of a `.test` script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    /// Empty line, echoed as an empty transcript line
    Blank,
    /// `# ...`, skipped entirely
    Comment,
    // Commands
    Echo(String),
    Connect(String),
    Connection(String),
    Sort(String),
    /// Anything else is a statement for the server
    Sql(String),
    /// `--<verb>` with a verb the interpreter does not know
    Unknown(String),
}

pub fn parse_line(line: &str) -> ScriptLine {
    let line = line.trim();
    if line.is_empty() {
        return ScriptLine::Blank;
    }
    if line.starts_with(COMMENT_PREFIX) {
        return ScriptLine::Comment;
    }

    match line.strip_prefix(COMMAND_PREFIX) {
        Some(command) => command_parser
            .parse(command)
            .unwrap_or_else(|_| ScriptLine::Unknown(command.trim().to_owned())),
        None => ScriptLine::Sql(line.to_owned()),
    }
}

fn command_parser(input: &mut &str) -> ModalResult<ScriptLine> {
    let _ = space0.parse_next(input)?;
    let verb = take_till(0.., ' ').parse_next(input)?;
    // Verb and argument are separated by exactly one space; the rest is verbatim.
    let _ = opt(' ').parse_next(input)?;
    let arg = rest.parse_next(input)?;

    let line = match verb {
        "echo" => ScriptLine::Echo(arg.to_owned()),
        "connect" => ScriptLine::Connect(arg.trim().to_owned()),
        "connection" => ScriptLine::Connection(arg.trim().to_owned()),
        "sort" => ScriptLine::Sort(arg.to_owned()),
        other => ScriptLine::Unknown(other.to_owned()),
    };
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_whitespace_lines() {
        assert_eq!(parse_line(""), ScriptLine::Blank);
        assert_eq!(parse_line("   \t"), ScriptLine::Blank);
    }

    #[test]
    fn test_comment() {
        assert_eq!(parse_line("# create the table first"), ScriptLine::Comment);
        assert_eq!(parse_line("   #indented"), ScriptLine::Comment);
    }

    #[test]
    fn test_sql_is_trimmed() {
        assert_eq!(
            parse_line("  select * from t;  \n"),
            ScriptLine::Sql("select * from t;".to_owned())
        );
    }

    #[test]
    fn test_echo_keeps_argument_verbatim() {
        assert_eq!(
            parse_line("--echo 1. create table"),
            ScriptLine::Echo("1. create table".to_owned())
        );
        assert_eq!(parse_line("-- echo"), ScriptLine::Echo(String::new()));
        assert_eq!(
            parse_line("--echo #not a comment"),
            ScriptLine::Echo("#not a comment".to_owned())
        );
    }

    #[test]
    fn test_connect_and_connection() {
        assert_eq!(
            parse_line("--connect replica"),
            ScriptLine::Connect("replica".to_owned())
        );
        assert_eq!(
            parse_line("-- connection  default"),
            ScriptLine::Connection("default".to_owned())
        );
        assert_eq!(parse_line("--connect"), ScriptLine::Connect(String::new()));
    }

    #[test]
    fn test_sort() {
        assert_eq!(
            parse_line("--sort select * from t;"),
            ScriptLine::Sort("select * from t;".to_owned())
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_line("--restart now"),
            ScriptLine::Unknown("restart".to_owned())
        );
        assert_eq!(parse_line("--"), ScriptLine::Unknown(String::new()));
    }

    #[test]
    fn test_verbs_are_case_sensitive() {
        assert_eq!(parse_line("--ECHO hi"), ScriptLine::Unknown("ECHO".to_owned()));
    }
}
