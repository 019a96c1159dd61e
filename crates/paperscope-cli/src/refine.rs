//! Interactive refinement: single key presses drive a `ReviewSession`.

use std::io::{self, Write};

use anyhow::Result;
use crossterm::ExecutableCommand;
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use paperscope_core::{
    DatasetStore, Record, ReviewAction, ReviewSession, SessionEnd, TermMatch, Transition,
};

/// What a key press asks for, before any category prompt is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Action(Command),
    AssignCategory,
    ClearCategory,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Reject,
    Next,
    Previous,
    Quit,
    Interrupt,
}

impl From<Command> for ReviewAction {
    fn from(command: Command) -> Self {
        match command {
            Command::Select => ReviewAction::Select,
            Command::Reject => ReviewAction::Reject,
            Command::Next => ReviewAction::Next,
            Command::Previous => ReviewAction::Previous,
            Command::Quit => ReviewAction::Quit,
            Command::Interrupt => ReviewAction::Interrupt,
        }
    }
}

pub fn map_key(code: KeyCode, modifiers: KeyModifiers) -> KeyCommand {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => KeyCommand::Action(Command::Interrupt),
            _ => KeyCommand::Ignored,
        };
    }
    match code {
        KeyCode::Char('s') => KeyCommand::Action(Command::Select),
        KeyCode::Char('r') => KeyCommand::Action(Command::Reject),
        KeyCode::Char('n') | KeyCode::Right | KeyCode::Down => KeyCommand::Action(Command::Next),
        KeyCode::Char('p') | KeyCode::Left | KeyCode::Up => KeyCommand::Action(Command::Previous),
        KeyCode::Char('q') | KeyCode::Esc => KeyCommand::Action(Command::Quit),
        KeyCode::Char('c') => KeyCommand::AssignCategory,
        KeyCode::Char('x') => KeyCommand::ClearCategory,
        _ => KeyCommand::Ignored,
    }
}

/// Split `text` into (segment, highlighted) runs. Overlapping or out of range
/// matches are skipped.
pub fn highlight_segments<'t>(text: &'t str, matches: &[TermMatch]) -> Vec<(&'t str, bool)> {
    let mut segments = Vec::new();
    let mut pos = 0;
    for m in matches {
        if m.start < pos || m.end > text.len() || m.start >= m.end {
            continue;
        }
        let (Some(before), Some(hit)) = (text.get(pos..m.start), text.get(m.start..m.end)) else {
            continue;
        };
        if !before.is_empty() {
            segments.push((before, false));
        }
        segments.push((hit, true));
        pos = m.end;
    }
    if let Some(rest) = text.get(pos..)
        && !rest.is_empty()
    {
        segments.push((rest, false));
    }
    segments
}

/// Restores the terminal when the session ends, however it ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            original_hook(info);
        }));
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

pub fn run_interactive<S: DatasetStore>(session: &mut ReviewSession<'_, S>) -> Result<SessionEnd> {
    let _guard = RawModeGuard::enable()?;
    let mut out = io::stdout();
    let mut status = String::from("s select · r reject · n/p move · c category · x clear · q quit");

    loop {
        render(&mut out, session, &status)?;

        let action = match map_key_event(read_key()?) {
            KeyCommand::Action(command) => ReviewAction::from(command),
            KeyCommand::AssignCategory => match prompt_assignment(&mut out, session)? {
                Some(action) => action,
                None => {
                    status = "category assignment cancelled".to_string();
                    continue;
                }
            },
            KeyCommand::ClearCategory => match prompt_clear(&mut out, session)? {
                Some(action) => action,
                None => {
                    status = "cancelled".to_string();
                    continue;
                }
            },
            KeyCommand::Ignored => continue,
        };

        status = match session.apply(action) {
            Ok(Transition::Ended(end)) => {
                write!(out, "\r\nProgress saved.\r\n")?;
                out.flush()?;
                return Ok(end);
            }
            Ok(transition) => describe(&transition),
            Err(e) if e.is_invalid_input() => e.to_string(),
            Err(e) => return Err(e.into()),
        };
    }
}

fn map_key_event(key: KeyEvent) -> KeyCommand {
    map_key(key.code, key.modifiers)
}

/// Block until the next key press. Repeats and releases are skipped.
fn read_key() -> Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            return Ok(key);
        }
    }
}

fn describe(transition: &Transition) -> String {
    match transition {
        Transition::Classified { index, state, changed } => {
            if *changed {
                format!("record {} marked {state}", index + 1)
            } else {
                format!("record {} already {state}", index + 1)
            }
        }
        Transition::CategoryAssigned { category, label, added, .. } => {
            if *added {
                format!("{category}: added {label}")
            } else {
                format!("{category}: {label} already set")
            }
        }
        Transition::CategoryCleared { category, removed, .. } => {
            if *removed > 0 {
                format!("{category}: {removed} label(s) cleared")
            } else {
                format!("{category} was not set")
            }
        }
        Transition::Moved { to, .. } => format!("record {}", to + 1),
        Transition::EndOfList => "already at the last record".to_string(),
        Transition::StartOfList => "already at the first record".to_string(),
        Transition::Ended(_) => String::new(),
    }
}

fn render<S: DatasetStore>(
    out: &mut impl Write,
    session: &ReviewSession<'_, S>,
    status: &str,
) -> Result<()> {
    out.execute(Clear(ClearType::All))?.execute(MoveTo(0, 0))?;

    let progress = session.dataset().progress();
    write!(
        out,
        "{} {}/{}  selected {} · rejected {} · unreviewed {}\r\n\r\n",
        "paperscope".bold(),
        (session.cursor() + 1).min(progress.total),
        progress.total,
        progress.selected,
        progress.rejected,
        progress.unreviewed,
    )?;

    match session.current() {
        Some(record) => render_record(out, record)?,
        None => write!(out, "No records.\r\n")?,
    }

    write!(out, "\r\n{}\r\n", status.dark_grey())?;
    out.flush()?;
    Ok(())
}

fn render_record(out: &mut impl Write, record: &Record) -> Result<()> {
    write!(out, "{}\r\n", record.title.as_str().bold())?;

    let mut meta = Vec::new();
    if !record.authors.is_empty() {
        meta.push(record.authors.join("; "));
    }
    if let Some(year) = record.publication_year {
        meta.push(year.to_string());
    }
    if !record.venue_name.is_empty() {
        meta.push(record.venue_name.clone());
    }
    if !meta.is_empty() {
        write!(out, "{}\r\n", meta.join(" · ").italic())?;
    }

    let ids: Vec<String> = record
        .identifiers
        .iter()
        .map(|(kind, value)| format!("{kind}: {value}"))
        .collect();
    if !ids.is_empty() {
        write!(out, "{}\r\n", ids.join("  "))?;
    }
    write!(
        out,
        "state: {}  sources: {}\r\n",
        record.selection_state,
        record.provenance.iter().cloned().collect::<Vec<_>>().join(", ")
    )?;
    for (category, labels) in &record.categories {
        write!(out, "{category}: {}\r\n", labels.join(", "))?;
    }

    if let Some(text) = &record.abstract_text {
        write!(out, "\r\n")?;
        for (segment, hit) in highlight_segments(text, &record.highlighted_terms) {
            if hit {
                write!(out, "{}", segment.yellow().bold())?;
            } else {
                write!(out, "{segment}")?;
            }
        }
        write!(out, "\r\n")?;
    }
    Ok(())
}

/// Ask for a 1-based choice among `options`; Esc or anything else cancels.
fn choose(out: &mut impl Write, heading: &str, options: &[String]) -> Result<Option<usize>> {
    write!(out, "\r\n{}\r\n", heading.bold())?;
    for (i, option) in options.iter().enumerate().take(9) {
        write!(out, "  {}  {option}\r\n", i + 1)?;
    }
    out.flush()?;

    let key = read_key()?;
    Ok(match key.code {
        KeyCode::Char(c) => c
            .to_digit(10)
            .and_then(|d| (d as usize).checked_sub(1))
            .filter(|i| *i < options.len().min(9)),
        _ => None,
    })
}

fn prompt_category<S: DatasetStore>(
    out: &mut impl Write,
    session: &ReviewSession<'_, S>,
) -> Result<Option<usize>> {
    let names: Vec<String> = session
        .config()
        .categories
        .iter()
        .map(|c| c.name.clone())
        .collect();
    if names.is_empty() {
        write!(out, "\r\nNo categories configured.\r\n")?;
        return Ok(None);
    }
    choose(out, "Category:", &names)
}

fn prompt_assignment<S: DatasetStore>(
    out: &mut impl Write,
    session: &ReviewSession<'_, S>,
) -> Result<Option<ReviewAction>> {
    let Some(index) = prompt_category(out, session)? else {
        return Ok(None);
    };
    let category = &session.config().categories[index];
    let Some(label) = choose(out, &format!("{}:", category.name), &category.labels)? else {
        return Ok(None);
    };
    Ok(Some(ReviewAction::AssignCategory {
        category: category.name.clone(),
        label: category.labels[label].clone(),
    }))
}

fn prompt_clear<S: DatasetStore>(
    out: &mut impl Write,
    session: &ReviewSession<'_, S>,
) -> Result<Option<ReviewAction>> {
    Ok(prompt_category(out, session)?.map(|index| ReviewAction::ClearCategory {
        category: session.config().categories[index].name.clone(),
    }))
}
