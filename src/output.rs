//! Terminal and JSON rendering of search results

use crate::index::types::SearchResult;
use crate::query::snippet::{EMPHASIS_END, EMPHASIS_START};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Split a snippet into `(text, emphasized)` runs
pub fn snippet_segments(snippet: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut rest = snippet;

    while let Some(start) = rest.find(EMPHASIS_START) {
        let after_start = &rest[start + EMPHASIS_START.len()..];
        let Some(end) = after_start.find(EMPHASIS_END) else {
            break;
        };
        if start > 0 {
            segments.push((&rest[..start], false));
        }
        segments.push((&after_start[..end], true));
        rest = &after_start[end + EMPHASIS_END.len()..];
    }

    if !rest.is_empty() {
        segments.push((rest, false));
    }
    segments
}

/// Print results as `path:page` headings followed by their highlighted snippet
pub fn print_results(results: &[SearchResult], color: bool, show_scores: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);

    for result in results {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        write!(stdout, "{}", result.path.display())?;
        stdout.reset()?;
        write!(stdout, ":")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", result.page)?;
        stdout.reset()?;
        if show_scores {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(stdout, " ({:.3})", result.score)?;
            stdout.reset()?;
        }
        writeln!(stdout)?;

        write!(stdout, "  ")?;
        for (text, emphasized) in snippet_segments(&result.snippet) {
            let text = text.replace(['\n', '\r'], " ");
            if emphasized {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
                write!(stdout, "{}", text)?;
                stdout.reset()?;
            } else {
                write!(stdout, "{}", text)?;
            }
        }
        writeln!(stdout)?;
        writeln!(stdout)?;
    }

    Ok(())
}

/// Print results as a JSON array
pub fn print_json(results: &[SearchResult]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, results)?;
    writeln!(stdout)
}
