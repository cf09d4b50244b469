//! Colored status lines for the command-line front end
//!
//! Successes go to stdout, warnings and errors to stderr. Write errors are
//! ignored: a closed stream never aborts a command.

use std::fmt;
use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Kind of status line; picks the marker, its color and the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl Status {
    fn marker(self) -> &'static str {
        match self {
            Self::Success => "✓ ",
            Self::Warning => "⚠️  ",
            Self::Error => "❌ ",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Success => Color::Green,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
        }
    }

    fn writer(self) -> BufferWriter {
        match self {
            Self::Success => BufferWriter::stdout(ColorChoice::Auto),
            Self::Warning | Self::Error => BufferWriter::stderr(ColorChoice::Auto),
        }
    }
}

/// Write one status line: colored marker, then the uncolored message.
pub fn write_status<W: WriteColor>(
    out: &mut W,
    status: Status,
    message: fmt::Arguments<'_>,
) -> std::io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(status.color())))?;
    write!(out, "{}", status.marker())?;
    out.reset()?;
    writeln!(out, "{message}")
}

/// Print a status line to its stream.
pub fn print_status(status: Status, message: fmt::Arguments<'_>) {
    let writer = status.writer();
    let mut buffer = writer.buffer();
    if write_status(&mut buffer, status, message).is_ok() {
        let _ = writer.print(&buffer);
    }
}

/// Print a warning to stderr
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::output::print_status($crate::output::Status::Warning, format_args!($($arg)*))
    };
}

/// Print an error to stderr
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::output::print_status($crate::output::Status::Error, format_args!($($arg)*))
    };
}

/// Print a success line to stdout
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        $crate::output::print_status($crate::output::Status::Success, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn render(status: Status, message: fmt::Arguments<'_>) -> String {
        let mut buffer = Buffer::no_color();
        write_status(&mut buffer, status, message).unwrap();
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn plain_output_is_marker_then_message() {
        assert_eq!(
            render(Status::Success, format_args!("Certificate {} deleted", "C1")),
            "✓ Certificate C1 deleted\n"
        );
        assert_eq!(
            render(Status::Error, format_args!("boom")),
            "❌ boom\n"
        );
    }

    #[test]
    fn colored_output_wraps_only_the_marker() {
        let mut buffer = Buffer::ansi();
        write_status(&mut buffer, Status::Warning, format_args!("keep the key")).unwrap();
        let text = String::from_utf8(buffer.into_inner()).unwrap();
        assert!(text.starts_with("\x1b["));
        assert!(text.ends_with("\x1b[0mkeep the key\n"));
    }
}
