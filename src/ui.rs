use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};

use crate::app::{App, ChatMode, EditorState, Sender};
use crate::markup::{self, Row, RowKind};
use crate::plan::Section;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, body_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if let Some(editor) = &app.editor {
        render_editor(editor, frame, area);
    } else if app.show_section_picker {
        render_section_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Account Planner ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}] ", app.session.id.as_str()),
            Style::default().fg(Color::White),
        ),
        Span::styled(app.client.base_url().to_string(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Green).bold()));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.mode() {
        ChatMode::Idle => (" IDLE ", Style::default().bg(Color::Blue).fg(Color::White)),
        ChatMode::AwaitingResponse => (" WAITING ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let dim_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let hint = |key: &'static str, label: &'static str, enabled: bool| {
        let label_style = if enabled { label_style } else { dim_style };
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let hints: Vec<Span> = if app.editor.is_some() {
        [
            hint(" ^S ", " save ", true),
            hint(" Esc ", " cancel ", true),
            hint(" Enter ", " newline ", true),
        ]
        .concat()
    } else if app.show_section_picker {
        [
            hint(" 1-5 ", " choose ", true),
            hint(" j/k ", " nav ", true),
            hint(" Enter ", " select ", true),
            hint(" Esc ", " cancel ", true),
        ]
        .concat()
    } else {
        [
            hint(" Enter ", " send ", app.mode() == ChatMode::Idle),
            hint(" ^R ", " reset ", true),
            hint(" ^D ", " dig deeper ", app.conflicts.is_some() && !app.digging),
            hint(" ^E ", " edit ", app.latest_plan.is_some()),
            hint(" ^T ", " voice ", app.voice.is_supported() && !app.listening),
            hint(" ^X ", " export ", true),
            hint(" PgUp/PgDn ", " scroll ", true),
            hint(" ^Q ", " quit ", true),
        ]
        .concat()
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner = app.banner_text().map(|text| {
        if app.digging {
            format!(" ⚠ {}  (digging deeper...) ", text)
        } else {
            format!(" ⚠ {}  [Ctrl+D dig deeper] ", text)
        }
    });
    let banner = banner.map(|text| {
        Paragraph::new(text)
            .style(Style::default().bg(Color::Yellow).fg(Color::Black).add_modifier(Modifier::BOLD))
            .wrap(Wrap { trim: false })
    });
    let banner_height = banner
        .as_ref()
        .map(|banner| banner.line_count(area.width).min(3) as u16)
        .unwrap_or(0);

    let [banner_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    if let Some(banner) = banner {
        frame.render_widget(banner, banner_area);
    }

    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Chat ");

    let lines = transcript_lines(app);
    let text = if lines.is_empty() {
        Text::from(Span::styled(
            "Name a company to research, e.g. \"Build an account plan for Zoom\"",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };
    let chat = Paragraph::new(text).wrap(Wrap { trim: false });

    // Scroll offset counted from the bottom so new messages stay in view.
    // Rows are counted by the same word wrapper that renders them.
    let total = chat.line_count(inner_width);
    let max_scroll = total.saturating_sub(app.chat_height as usize).min(u16::MAX as usize) as u16;
    app.scroll_back = app.scroll_back.min(max_scroll);
    let scroll = max_scroll - app.scroll_back;

    frame.render_widget(chat.block(block).scroll((scroll, 0)), area);

    if max_scroll > 0 {
        let mut state = ScrollbarState::new(max_scroll as usize).position(scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut state,
        );
    }
}

fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.messages {
        let (label, color) = match msg.sender {
            Sender::User => ("You:", Color::Cyan),
            Sender::Bot => ("Planner:", Color::Yellow),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));

        let rows = markup::layout_rows(&markup::message_view(&msg.body));
        let rows = match msg.visible_chars {
            Some(limit) => markup::truncate_rows(rows, limit),
            None => rows,
        };
        lines.extend(rows.into_iter().map(row_line));
        lines.push(Line::default());
    }

    if app.loading {
        lines.push(Line::from(Span::styled(
            "Planner:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn row_line(row: Row) -> Line<'static> {
    match row.kind {
        RowKind::Heading => Line::from(Span::styled(
            row.text,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        RowKind::SectionTitle => Line::from(Span::styled(
            row.text,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        RowKind::Field { label_len } => {
            let split = row
                .text
                .char_indices()
                .nth(label_len)
                .map(|(i, _)| i)
                .unwrap_or(row.text.len());
            let (label, value) = row.text.split_at(split);
            Line::from(vec![
                Span::styled(label.to_string(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(value.to_string()),
            ])
        }
        RowKind::Label => Line::from(Span::styled(
            row.text,
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )),
        RowKind::Preformatted => Line::from(Span::styled(row.text, Style::default().fg(Color::Gray))),
        RowKind::Body | RowKind::Bullet => Line::from(row.text),
        RowKind::Blank => Line::default(),
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = match app.mode() {
        ChatMode::Idle => (" Message (Enter to send) ", Color::Yellow),
        ChatMode::AwaitingResponse => (" Waiting for reply... ", Color::DarkGray),
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Popups own the cursor while open
    if app.editor.is_none() && !app.show_section_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

/// Centered popup rect, shrunk to fit inside `area`
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_section_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let sections = Section::all();
    let popup_area = popup_area(area, 44, sections.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Edit Section (1-5 or Enter, Esc to cancel) ");

    let items: Vec<ListItem> = sections
        .iter()
        .map(|section| ListItem::new(format!(" {}. {} ", section.number(), section.display_name())))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.section_picker_state);
}

fn render_editor(editor: &EditorState, frame: &mut Frame, area: Rect) {
    let popup_area = popup_area(area, area.width / 10 * 7, area.height / 10 * 6);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} ", editor.title()));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [text_area, hint_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(inner);

    // Cursor as (line, column) within the content
    let before: Vec<char> = editor.content.chars().take(editor.cursor).collect();
    let cursor_line = before.iter().filter(|c| **c == '\n').count() as u16;
    let cursor_col = before.iter().rev().take_while(|c| **c != '\n').count() as u16;

    let scroll_y = cursor_line.saturating_sub(text_area.height.saturating_sub(1));
    let scroll_x = cursor_col.saturating_sub(text_area.width.saturating_sub(1));

    let text = Paragraph::new(editor.content.as_str())
        .style(Style::default().fg(Color::Cyan))
        .scroll((scroll_y, scroll_x));
    frame.render_widget(text, text_area);

    let hint = if editor.saving {
        Span::styled("Saving...", Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC))
    } else {
        Span::styled(
            "Ctrl+S to save, Esc to cancel, Enter for a new line",
            Style::default().fg(Color::DarkGray),
        )
    };
    frame.render_widget(Paragraph::new(Line::from(hint)), hint_area);

    if !editor.saving {
        frame.set_cursor_position((
            text_area.x + cursor_col - scroll_x,
            text_area.y + cursor_line - scroll_y,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::conflict::ConflictSet;
    use crate::plan::tests::PLAN_JSON;
    use crate::plan::{AccountPlan, MessageBody};
    use ratatui::{backend::TestBackend, Terminal};

    fn test_app() -> App {
        App::new(&Config {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Config::new()
        })
    }

    fn draw(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| render(app, f)).unwrap();

        let buffer = terminal.backend().buffer();
        (0..buffer.area().height)
            .map(|y| {
                (0..buffer.area().width)
                    .map(|x| buffer.cell((x, y)).map(|c| c.symbol()).unwrap_or(" "))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn loader_shows_thinking() {
        let mut app = test_app();
        app.loading = true;
        let screen = draw(&mut app, 80, 20);
        assert!(screen.contains("Thinking."));
        assert!(screen.contains("WAITING"));
    }

    #[test]
    fn plan_and_banner_are_drawn() {
        let mut app = test_app();
        app.add_message(Sender::Bot, MessageBody::Plan(AccountPlan::parse(PLAN_JSON).unwrap()));
        app.conflicts = Some(
            serde_json::from_str::<ConflictSet>(r#"{"budget":[{"value":"10k"},{"value":"20k"}]}"#).unwrap(),
        );

        let screen = draw(&mut app, 100, 60);
        assert!(screen.contains("I'm finding conflicting data: budget: 10k / 20k"));
        assert!(screen.contains("HQ: San Jose, CA"));
        assert!(screen.contains("Confidence: 0.82"));
    }

    #[test]
    fn partial_reveal_hides_the_rest() {
        let mut app = test_app();
        let idx = app.add_message(Sender::Bot, MessageBody::Text("Hello there, researcher".to_string()));
        app.messages[idx].visible_chars = Some(5);

        let screen = draw(&mut app, 80, 20);
        assert!(screen.contains("Hello"));
        assert!(!screen.contains("researcher"));
    }

    #[test]
    fn scroll_back_is_clamped_to_content() {
        let mut app = test_app();
        for i in 0..40 {
            app.add_message(Sender::User, MessageBody::Text(format!("message {}", i)));
        }
        app.scroll_back = u16::MAX;
        let screen = draw(&mut app, 80, 20);
        assert!(screen.contains("message 0"));
        assert!(!screen.contains("message 39"));
        assert!(app.scroll_back < u16::MAX);
    }

    #[test]
    fn editor_modal_shows_title_and_text() {
        let mut app = test_app();
        app.add_message(Sender::Bot, MessageBody::Plan(AccountPlan::parse(PLAN_JSON).unwrap()));
        app.open_editor(Section::KeyStakeholders);

        let screen = draw(&mut app, 100, 40);
        assert!(screen.contains("Edit: key_stakeholders"));
        assert!(screen.contains("CEO: Eric Yuan"));
    }

    #[test]
    fn newest_message_visible_after_word_wrap() {
        let mut app = test_app();
        let words: Vec<String> = (0..20).map(|i| format!("word{:06}", i)).collect();
        app.add_message(Sender::Bot, MessageBody::Text(words.join(" ")));
        app.add_message(Sender::User, MessageBody::Text("NEWEST".to_string()));

        // each ten-letter word wraps onto its own row at this width
        let screen = draw(&mut app, 20, 20);
        assert!(screen.contains("NEWEST"), "newest message scrolled out of view:\n{}", screen);
        assert!(!screen.contains("word000000"));
    }

    #[test]
    fn long_banner_wraps_without_hiding_transcript() {
        let mut app = test_app();
        app.add_message(Sender::User, MessageBody::Text("hello".to_string()));
        app.conflicts = Some(
            serde_json::from_str::<ConflictSet>(
                r#"{"revenue":[{"value":"4B"},{"value":"6B"}],"employees":[{"value":"2k"},{"value":"3k"}]}"#,
            )
            .unwrap(),
        );

        let screen = draw(&mut app, 30, 24);
        assert!(screen.contains("conflicting"));
        assert!(screen.contains("hello"));
    }
}
