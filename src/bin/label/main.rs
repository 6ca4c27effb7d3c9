mod app;

use std::io;
use std::path::PathBuf;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};

use app::{truncate, Answer, AppState};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [tasks, dataset] = args.as_slice() else {
        eprintln!("usage: label <tasks.jsonl> <dataset.jsonl>");
        std::process::exit(2);
    };

    let mut app = match AppState::load(&PathBuf::from(tasks), &PathBuf::from(dataset)) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("An error occurred: {e}");
            std::process::exit(1);
        }
    };

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    println!(
        "{} answers saved to {} ({} tasks left)",
        app.answered,
        app.dataset.display(),
        app.tasks.len().saturating_sub(app.position)
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| render(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
            KeyCode::Down | KeyCode::Char('j') => app.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => app.move_cursor(-1),
            KeyCode::Enter => app.choose(app.cursor)?,
            KeyCode::Char('x') => app.reject()?,
            KeyCode::Char(' ') => app.skip()?,
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                app.choose(index)?;
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    if app.finished() {
        render_done(f, app, chunks[1]);
    } else {
        render_body(f, app, chunks[1]);
    }
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let last = match &app.last_answer {
        Some((answer, key)) => {
            let color = match answer {
                Answer::Accept => Color::Green,
                Answer::Reject => Color::Red,
                Answer::Ignore => Color::DarkGray,
            };
            Span::styled(format!("last: {answer} {}", truncate(key, 30)), Style::default().fg(color))
        }
        None => Span::styled("last: —", Style::default().fg(Color::DarkGray)),
    };

    let title_spans = vec![
        Span::styled(
            " Window Labeler  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                "{}/{} this session",
                app.position.min(app.tasks.len()),
                app.tasks.len()
            ),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("{} answered earlier", app.already_done),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        last,
    ];

    let paragraph = Paragraph::new(Line::from(title_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, area: Rect) {
    let Some(task) = app.current() else {
        return;
    };

    // Horizontal split: task (60%) | options (40%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let label = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut lines = Vec::new();
    if let Some(text) = task.text() {
        lines.push(Line::from(vec![Span::styled("text   ", label), Span::raw(text)]));
    }
    if let Some(image) = task.image() {
        lines.push(Line::from(vec![Span::styled("image  ", label), Span::raw(image)]));
    }
    if let Some(meta) = task.meta() {
        lines.push(Line::from(Span::styled("meta", label)));
        let pretty = serde_json::to_string_pretty(meta).unwrap_or_else(|_| meta.to_string());
        lines.extend(pretty.lines().map(|l| Line::from(format!("  {l}"))));
    }

    let details = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                format!(" TASK {} ", app.position + 1),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(details, halves[0]);

    let items: Vec<ListItem> = task
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::raw(o.text.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(
                    " OPTIONS ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    let mut state = ListState::default().with_selected(Some(app.cursor));
    f.render_stateful_widget(list, halves[1], &mut state);
}

fn render_done(f: &mut Frame, app: &AppState, area: Rect) {
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            "No tasks left.",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(format!(
            "{} answers saved to {}",
            app.answered,
            app.dataset.display()
        )),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("move  "),
        Span::styled("[enter / 1-9] ", Style::default().fg(Color::Yellow)),
        Span::raw("accept option  "),
        Span::styled("[x] ", Style::default().fg(Color::Yellow)),
        Span::raw("reject  "),
        Span::styled("[space] ", Style::default().fg(Color::Yellow)),
        Span::raw("skip"),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
