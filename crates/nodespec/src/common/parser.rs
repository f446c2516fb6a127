use std::fmt::{Debug, Formatter};

use nom::IResult;
use nom::combinator::all_consuming;
use nom::error::{ErrorKind, ParseError};

/// Remembers only the innermost failure, which is what gets reported.
pub struct ParserError<I> {
    input: I,
    kind: ErrorKind,
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parser error at '{:?}': expecting {:?}",
            self.input, self.kind
        )
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError { input, kind }
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

pub(crate) fn format_parse_error<I: Debug>(error: nom::Err<ParserError<I>>) -> anyhow::Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => anyhow::anyhow!("{:?}", e),
        _ => anyhow::anyhow!(error.to_string()),
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;

/// Runs `parser` and fails unless it consumes the whole input.
pub fn consume_all<'a, O, F>(mut parser: F, input: &'a str) -> anyhow::Result<O>
where
    F: FnMut(&'a str) -> NomResult<'a, O>,
{
    all_consuming(|i| parser(i))(input)
        .map(|(_, output)| output)
        .map_err(format_parse_error)
}
