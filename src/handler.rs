use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use std::time::Instant;

use crate::app::{App, EditorState};
use crate::plan::Section;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick(Instant::now()),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        app.should_quit = true;
        return;
    }

    if app.editor.is_some() {
        handle_editor(app, key, ctrl);
    } else if app.show_section_picker {
        handle_section_picker(app, key);
    } else if ctrl {
        handle_chat_command(app, key);
    } else {
        handle_chat_input(app, key);
    }
}

fn handle_chat_command(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('r') => app.reset(),
        KeyCode::Char('d') => app.dig_deeper(),
        KeyCode::Char('e') => app.open_section_picker(),
        KeyCode::Char('t') => app.start_voice(),
        KeyCode::Char('x') => {
            if let Err(e) = app.export_transcript() {
                tracing::error!("transcript export failed: {:#}", e);
                app.status = Some(format!("Export failed: {}", e));
            }
        }
        _ => {}
    }
}

fn handle_chat_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.send_message(),
        KeyCode::Esc if app.is_revealing() => app.finish_reveal(),
        KeyCode::PageUp => app.scroll_up(app.page_lines()),
        KeyCode::PageDown => app.scroll_down(app.page_lines()),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
            app.status = None;
        }
        _ => {}
    }
}

fn handle_section_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_section_picker = false,
        KeyCode::Up | KeyCode::Char('k') => app.section_picker_nav_up(),
        KeyCode::Down | KeyCode::Char('j') => app.section_picker_nav_down(),
        KeyCode::Enter => app.select_section(),
        KeyCode::Char(c @ '1'..='5') => {
            let number = c as usize - '0' as usize;
            if let Some(section) = Section::all().into_iter().find(|s| s.number() == number) {
                app.open_editor(section);
            }
        }
        _ => {}
    }
}

fn handle_editor(app: &mut App, key: KeyEvent, ctrl: bool) {
    match key.code {
        KeyCode::Esc => app.cancel_editor(),
        KeyCode::Char('s') if ctrl => app.save_editor(),
        _ => {
            if let Some(editor) = app.editor.as_mut().filter(|e| !e.saving) {
                edit_text(editor, key, ctrl);
            }
        }
    }
}

fn edit_text(editor: &mut EditorState, key: KeyEvent, ctrl: bool) {
    match key.code {
        KeyCode::Enter => insert_char(editor, '\n'),
        KeyCode::Char(c) if !ctrl => insert_char(editor, c),
        KeyCode::Backspace => {
            if editor.cursor > 0 {
                editor.cursor -= 1;
                let byte_pos = char_to_byte_index(&editor.content, editor.cursor);
                editor.content.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if editor.cursor < editor.content.chars().count() {
                let byte_pos = char_to_byte_index(&editor.content, editor.cursor);
                editor.content.remove(byte_pos);
            }
        }
        KeyCode::Left => editor.cursor = editor.cursor.saturating_sub(1),
        KeyCode::Right => {
            editor.cursor = (editor.cursor + 1).min(editor.content.chars().count());
        }
        KeyCode::Up => editor.cursor = line_start(&editor.content, editor.cursor).saturating_sub(1),
        KeyCode::Down => {
            let len = editor.content.chars().count();
            editor.cursor = (line_end(&editor.content, editor.cursor) + 1).min(len);
        }
        KeyCode::Home => editor.cursor = line_start(&editor.content, editor.cursor),
        KeyCode::End => editor.cursor = line_end(&editor.content, editor.cursor),
        _ => {}
    }
}

fn insert_char(editor: &mut EditorState, c: char) {
    let byte_pos = char_to_byte_index(&editor.content, editor.cursor);
    editor.content.insert(byte_pos, c);
    editor.cursor += 1;
}

/// Char index of the first character on the cursor's line
fn line_start(text: &str, cursor: usize) -> usize {
    text.chars()
        .take(cursor)
        .enumerate()
        .filter(|(_, c)| *c == '\n')
        .last()
        .map(|(i, _)| i + 1)
        .unwrap_or(0)
}

/// Char index of the newline ending the cursor's line (or the text length)
fn line_end(text: &str, cursor: usize) -> usize {
    text.chars()
        .enumerate()
        .skip(cursor)
        .find(|(_, c)| *c == '\n')
        .map(|(i, _)| i)
        .unwrap_or_else(|| text.chars().count())
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}
