// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
A notification backend that sends colorized output to the terminal.

Notes go to standard output; everything more serious goes to standard error.
Only the prefix word ("warning:", "error:", ...) is colorized.

*/

use anyhow::Error;
use std::backtrace::BacktraceStatus;
use std::fmt::Arguments;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::{ChatterLevel, NotificationBackend, NotificationKind};

/// A notification backend that writes colorized output to the terminal.
pub struct TermcolorNotificationBackend {
    chatter: ChatterLevel,
    stdout: StandardStream,
    stderr: StandardStream,
}

impl TermcolorNotificationBackend {
    /// Create a new TermcolorNotificationBackend that colorizes its output
    /// when the terminal supports it.
    pub fn new(chatter: ChatterLevel) -> TermcolorNotificationBackend {
        Self::with_color_choice(chatter, ColorChoice::Auto)
    }

    /// Create a new TermcolorNotificationBackend with an explicit color
    /// policy.
    pub fn with_color_choice(chatter: ChatterLevel, choice: ColorChoice) -> Self {
        TermcolorNotificationBackend {
            chatter,
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn spec_for(kind: NotificationKind) -> ColorSpec {
        let color = match kind {
            NotificationKind::Note => Color::Green,
            NotificationKind::Warning => Color::Yellow,
            NotificationKind::Severe | NotificationKind::Fatal => Color::Red,
        };

        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        spec
    }

    fn default_prefix(kind: NotificationKind) -> &'static str {
        match kind {
            NotificationKind::Note => "note:",
            NotificationKind::Warning => "warning:",
            NotificationKind::Severe => "severe:",
            NotificationKind::Fatal => "fatal:",
        }
    }

    /// Write one line of output. Failures to write to the terminal are
    /// ignored since there is nowhere left to report them.
    fn emit(&mut self, kind: NotificationKind, prefix: &str, args: Arguments) {
        if kind == NotificationKind::Note && self.chatter <= ChatterLevel::Minimal {
            return;
        }

        let stream = if kind == NotificationKind::Note {
            &mut self.stdout
        } else {
            &mut self.stderr
        };

        let _ = stream.set_color(&Self::spec_for(kind));
        let _ = write!(stream, "{prefix}");
        let _ = stream.reset();
        let _ = writeln!(stream, " {args}");
    }

    fn emit_causes(&mut self, kind: NotificationKind, err: &Error, skip_first: bool) {
        for cause in err.chain().skip(skip_first as usize) {
            self.emit(kind, "caused by:", format_args!("{cause}"));
        }

        let backtrace = err.backtrace();

        if backtrace.status() == BacktraceStatus::Captured {
            self.emit(kind, "debugging:", format_args!("backtrace follows:"));
            let _ = writeln!(self.stderr, "{backtrace}");
        }
    }

    /// Print the information contained in an Error object.
    ///
    /// This function prints out the error, the sub-errors that caused it, and
    /// its associated backtrace if one was captured, with colorization.
    pub fn bare_error<E: Into<Error>>(&mut self, err: E) {
        let err = err.into();
        self.emit(NotificationKind::Severe, "error:", format_args!("{err}"));
        self.emit_causes(NotificationKind::Severe, &err, true);
    }
}

impl NotificationBackend for TermcolorNotificationBackend {
    fn notify(&mut self, kind: NotificationKind, args: Arguments, err: Option<Error>) {
        self.emit(kind, Self::default_prefix(kind), args);

        if let Some(e) = err {
            self.emit_causes(kind, &e, false);
        }
    }
}
