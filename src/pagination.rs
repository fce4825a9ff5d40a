use serde::{Deserialize, Serialize};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::{MAX_ROW_WIDTH, PAGE_SIZE};
use crate::error::BotError;

/// One search hit, as extracted from the results page. Immutable once the
/// list is built; `index` is its 1-based position in that list and stays
/// stable for the whole browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub index: usize,
    pub year: String,
    pub title: String,
    pub link: String,
}

/// Identity of one browsing session: the chat plus the message carrying
/// the paged keyboard. At most one live `PageState` per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chat_id: i64,
    pub message_id: i32,
}

impl SessionKey {
    /// File-name form, `{chat}_{message}`.
    pub fn storage_name(&self) -> String {
        format!("{}_{}", self.chat_id, self.message_id)
    }
}

/// Persisted state of one paged search browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub key: SessionKey,
    pub results: Vec<ResultRecord>,
    pub current_page: usize,
}

impl PageState {
    pub fn new(key: SessionKey, results: Vec<ResultRecord>) -> Self {
        Self {
            key,
            results,
            current_page: 0,
        }
    }

    /// Resolves a selector token (absolute 1-based position) against the
    /// stored list. Tokens address the original list, not the visible
    /// slice, so they stay valid across page changes.
    pub fn record_at(&self, position: usize) -> Result<&ResultRecord, BotError> {
        position
            .checked_sub(1)
            .and_then(|i| self.results.get(i))
            .ok_or(BotError::InvalidToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Visible window for `page`: `(start, end_exclusive, items)`.
pub fn slice(results: &[ResultRecord], page: usize) -> (usize, usize, &[ResultRecord]) {
    let start = (page * PAGE_SIZE).min(results.len());
    let end = (start + PAGE_SIZE).min(results.len());
    (start, end, &results[start..end])
}

pub fn is_first_page(page: usize) -> bool {
    page == 0
}

pub fn is_last_page(results: &[ResultRecord], page: usize) -> bool {
    page >= max_page(results)
}

pub fn max_page(results: &[ResultRecord]) -> usize {
    if results.is_empty() {
        0
    } else {
        (results.len() - 1) / PAGE_SIZE
    }
}

/// One step back or forward. The boundary check lives here, not in the
/// caller, so duplicate or late callbacks can never walk out of range.
pub fn advance(results: &[ResultRecord], page: usize, dir: Direction) -> Result<usize, BotError> {
    match dir {
        Direction::Previous if is_first_page(page) => Err(BotError::AtBoundary),
        Direction::Previous => Ok(page - 1),
        Direction::Next if is_last_page(results, page) => Err(BotError::AtBoundary),
        Direction::Next => Ok(page + 1),
    }
}

/// HTML body of the current page: the range line plus one linked line per
/// visible record, numbered by absolute position.
pub fn page_text(state: &PageState) -> String {
    let (start, end, items) = slice(&state.results, state.current_page);
    let shown_from = if items.is_empty() { 0 } else { start + 1 };

    let mut text = format!(
        "<i>Resultados {}/{} de {}</i>\n\n",
        shown_from,
        end,
        state.results.len()
    );
    for item in items {
        text.push_str(&format!(
            "[<b>{}</b>] <a href='{}'>{} - {}</a>\n",
            item.index, item.link, item.year, item.title
        ));
    }
    text
}

/// Selector buttons for the visible slice (token = absolute 1-based
/// position, `pick:<n>`), then the fixed navigation row: prev, close, next.
pub fn page_keyboard(state: &PageState) -> InlineKeyboardMarkup {
    let (start, end, _) = slice(&state.results, state.current_page);

    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    let mut row = Vec::new();
    for position in start + 1..=end {
        row.push(InlineKeyboardButton::callback(
            position.to_string(),
            format!("pick:{position}"),
        ));
        if row.len() == MAX_ROW_WIDTH {
            rows.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }

    rows.push(vec![
        InlineKeyboardButton::callback("⬅️", "prev"),
        InlineKeyboardButton::callback("❌", "close"),
        InlineKeyboardButton::callback("➡️", "next"),
    ]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<ResultRecord> {
        (1..=n)
            .map(|i| ResultRecord {
                index: i,
                year: format!("{}", 2000 + i),
                title: format!("Película {i}"),
                link: format!("https://example.com/film{i}.html"),
            })
            .collect()
    }

    fn state(n: usize, page: usize) -> PageState {
        PageState {
            key: SessionKey {
                chat_id: -100,
                message_id: 42,
            },
            results: records(n),
            current_page: page,
        }
    }

    #[test]
    fn slices_cover_the_list_without_gaps_or_overlaps() {
        let list = records(23);
        let mut seen = Vec::new();
        for page in 0..=max_page(&list) {
            let (start, end, items) = slice(&list, page);
            assert_eq!(items.len(), end - start);
            assert_eq!(items.len(), PAGE_SIZE.min(list.len() - page * PAGE_SIZE));
            seen.extend(items.iter().map(|r| r.index));
        }
        assert_eq!(seen, (1..=23).collect::<Vec<_>>());
    }

    #[test]
    fn empty_list_slices_to_nothing() {
        let (start, end, items) = slice(&[], 0);
        assert_eq!((start, end), (0, 0));
        assert!(items.is_empty());
    }

    #[test]
    fn boundary_flags() {
        let list = records(23);
        assert!(is_first_page(0));
        assert!(!is_first_page(1));
        assert!(!is_last_page(&list, 3));
        assert!(is_last_page(&list, 4));
        assert_eq!(max_page(&list), 4);
    }

    #[test]
    fn advance_refuses_to_leave_the_range() {
        let list = records(23);
        assert!(matches!(
            advance(&list, 0, Direction::Previous),
            Err(BotError::AtBoundary)
        ));
        assert!(matches!(
            advance(&list, 4, Direction::Next),
            Err(BotError::AtBoundary)
        ));
        assert_eq!(advance(&list, 0, Direction::Next).unwrap(), 1);
        assert_eq!(advance(&list, 4, Direction::Previous).unwrap(), 3);
    }

    #[test]
    fn page_text_reports_one_based_inclusive_ranges() {
        let first = page_text(&state(12, 0));
        assert!(first.contains("Resultados 1/5 de 12"));
        assert!(first.contains("[<b>1</b>]"));
        assert!(first.contains("[<b>5</b>]"));
        assert!(!first.contains("[<b>6</b>]"));

        let last = page_text(&state(12, 2));
        assert!(last.contains("Resultados 11/12 de 12"));
        assert!(last.contains("[<b>11</b>]"));
        assert!(last.contains("[<b>12</b>]"));
    }

    #[test]
    fn keyboard_ends_with_the_navigation_row() {
        let kb = page_keyboard(&state(12, 1));
        let rows = &kb.inline_keyboard;
        // one selector row (5 <= 8 wide) plus the nav row
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 5);
        let nav = rows.last().unwrap();
        assert_eq!(nav.len(), 3);
    }

    #[test]
    fn selector_tokens_encode_absolute_positions() {
        use teloxide::types::InlineKeyboardButtonKind;

        let kb = page_keyboard(&state(12, 1));
        let tokens: Vec<String> = kb.inline_keyboard[0]
            .iter()
            .map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(d) => d.clone(),
                other => panic!("unexpected button kind: {other:?}"),
            })
            .collect();
        assert_eq!(tokens, vec!["pick:6", "pick:7", "pick:8", "pick:9", "pick:10"]);
    }

    #[test]
    fn tokens_resolve_the_same_record_from_any_page() {
        let on_page_1 = state(12, 1);
        let on_page_2 = state(12, 2);
        assert_eq!(
            on_page_1.record_at(7).unwrap(),
            on_page_2.record_at(7).unwrap()
        );
        assert!(matches!(on_page_1.record_at(0), Err(BotError::InvalidToken)));
        assert!(matches!(
            on_page_1.record_at(13),
            Err(BotError::InvalidToken)
        ));
    }
}
