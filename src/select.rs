use std::io::{self, BufRead, StdinLock, Stdout, Write};

use crossterm::style::Stylize;

use crate::domain::PaperRecord;
use crate::error::FetchError;

const ABSTRACT_PREVIEW: usize = 200;

/// Picks the seed among search candidates. `None` means the user gave up.
pub trait Selector {
    fn choose(&mut self, candidates: &[PaperRecord]) -> Result<Option<usize>, FetchError>;
}

/// Takes the top-ranked candidate without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidate;

impl Selector for FirstCandidate {
    fn choose(&mut self, candidates: &[PaperRecord]) -> Result<Option<usize>, FetchError> {
        Ok((!candidates.is_empty()).then_some(0))
    }
}

/// Numbered prompt on a terminal (or any reader/writer pair).
pub struct ConsoleSelector<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl ConsoleSelector<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn list(&mut self, candidates: &[PaperRecord]) -> io::Result<()> {
        writeln!(self.output, "\nFound papers:")?;
        for (position, paper) in candidates.iter().enumerate() {
            let year = paper
                .year
                .map(|year| year.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            writeln!(
                self.output,
                "\n{}. {} ({year})",
                position + 1,
                paper.title.as_str().bold()
            )?;
            writeln!(self.output, "   Authors: {}", paper.authors.join(", "))?;
            if let Some(text) = &paper.abstract_text {
                writeln!(self.output, "   Abstract: {}", preview(text))?;
            }
            writeln!(self.output, "   ID: {}", paper.id.as_str().dim())?;
        }
        Ok(())
    }

    fn prompt(&mut self, count: usize) -> io::Result<Option<usize>> {
        loop {
            write!(
                self.output,
                "\nEnter the number of the paper to download (or 'q' to quit): "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let choice = line.trim();
            if choice.eq_ignore_ascii_case("q") {
                return Ok(None);
            }
            match choice.parse::<usize>() {
                Ok(number) if (1..=count).contains(&number) => return Ok(Some(number - 1)),
                Ok(_) => writeln!(self.output, "Invalid choice. Please try again.")?,
                Err(_) => writeln!(self.output, "Please enter a valid number or 'q' to quit.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Selector for ConsoleSelector<R, W> {
    fn choose(&mut self, candidates: &[PaperRecord]) -> Result<Option<usize>, FetchError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        self.list(candidates)
            .and_then(|()| self.prompt(candidates.len()))
            .map_err(|err| FetchError::Console(err.to_string()))
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(ABSTRACT_PREVIEW).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
