//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::SP;
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, output and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_console(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:02X}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw register file, PC, SP and flags.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = &app.cpu.regs;

    let reg_spans = |range: std::ops::Range<usize>| -> Line<'static> {
        let spans: Vec<Span<'static>> = range
            .map(|i| {
                let style = if i == SP as usize {
                    Style::default().fg(Color::Magenta)
                } else if regs.r[i] != 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                Span::styled(format!("R{}={:02X}  ", i, regs.r[i]), style)
            })
            .collect();
        Line::from(spans)
    };

    let content = vec![
        reg_spans(0..4),
        reg_spans(4..8),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:02X}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("   SP: "),
            Span::styled(format!("{:02X}", regs.sp()), Style::default().fg(Color::Magenta)),
            Span::raw("   "),
            Span::styled(format!("{:?}", regs.fl), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.cpu.state),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view as rows of hex bytes.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let row_bytes = DebuggerApp::ROW_BYTES;
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.mem_scroll;
    let end = (start + visible_rows).min(MEMORY_SIZE / row_bytes);

    let pc = app.cpu.regs.pc as usize;
    let sp = app.cpu.regs.sp() as usize;
    let cells = app.cpu.mem.as_slice();

    let items: Vec<ListItem> = (start..end)
        .map(|row| {
            let base = row * row_bytes;
            let mut spans = vec![Span::styled(
                format!("{:02X}: ", base),
                Style::default().fg(Color::DarkGray),
            )];

            for addr in base..base + row_bytes {
                let value = cells[addr];
                let style = if addr == pc {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else if addr == sp {
                    Style::default().fg(Color::Magenta)
                } else if value != 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                spans.push(Span::styled(format!("{:02X} ", value), style));
            }

            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw program output.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    // Keep the tail visible.
    let visible = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = app.console.lines().collect();
    let tail = lines[lines.len().saturating_sub(visible)..].join("\n");

    let console = Paragraph::new(tail)
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Output ")
            .borders(Borders::ALL));

    frame.render_widget(console, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
