//! 节假日日历：解析 iCalendar 事件流并按日期区间与数量过滤
//!
//! 事件按源顺序保留（不保证按日期排序）；DTSTART 无法解析的事件直接跳过。
//! 过滤时每轮先检查数量上限，再检查 before / after 日期条件。

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// 单个日历事件：全天开始日期 + 摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub summary: String,
}

impl CalendarEvent {
    pub fn new(date: NaiveDate, summary: impl Into<String>) -> Self {
        Self {
            date,
            summary: summary.into(),
        }
    }

    /// 全天事件的开始时刻（UTC 零点）
    pub fn start_at(&self) -> DateTime<Utc> {
        self.date.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn format_line(&self) -> String {
        format!("{}: {}", self.date.format("%Y-%m-%d"), self.summary)
    }
}

/// 过滤条件：before / after 为开区间外的排除边界，max_count 仅在 > 0 时生效
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayFilter {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub max_count: Option<usize>,
}

/// 过滤事件并格式化为 `YYYY-MM-DD: <summary>`，按行拼接；无匹配时为空字符串
pub fn filter_events(events: &[CalendarEvent], filter: &HolidayFilter) -> String {
    let max_count = filter.max_count.filter(|m| *m > 0);
    let mut lines = Vec::new();
    for event in events {
        if max_count.is_some_and(|max| lines.len() >= max) {
            break;
        }

        let start = event.start_at();
        if filter.before.is_some_and(|before| start > before) {
            continue;
        }
        if filter.after.is_some_and(|after| start < after) {
            continue;
        }

        lines.push(event.format_line());
    }
    lines.join("\n")
}

/// 解析 iCalendar 文本中的 VEVENT
pub fn parse_calendar(feed: &str) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current: Option<(Option<String>, String)> = None;
    // VEVENT 内嵌组件（如 VALARM）的深度
    let mut nested = 0usize;

    for line in unfold_lines(feed) {
        let Some((name, value)) = split_property(&line) else {
            continue;
        };

        match (name.as_str(), value) {
            ("BEGIN", v) if v.eq_ignore_ascii_case("VEVENT") && current.is_none() => {
                current = Some((None, String::new()));
                nested = 0;
            }
            ("BEGIN", _) if current.is_some() => nested += 1,
            ("END", v) if v.eq_ignore_ascii_case("VEVENT") && nested == 0 => {
                if let Some((start, summary)) = current.take() {
                    match start.as_deref().and_then(parse_all_day_date) {
                        Some(date) => events.push(CalendarEvent { date, summary }),
                        None => tracing::debug!(summary = %summary, "skipping event with malformed DTSTART"),
                    }
                }
            }
            ("END", _) if current.is_some() => nested = nested.saturating_sub(1),
            ("DTSTART", v) if nested == 0 => {
                if let Some((start, _)) = current.as_mut() {
                    *start = Some(v.to_string());
                }
            }
            ("SUMMARY", v) if nested == 0 => {
                if let Some((_, summary)) = current.as_mut() {
                    *summary = unescape_text(v);
                }
            }
            _ => {}
        }
    }

    events
}

/// 展开折行：以空格或制表符开头的行是上一行的续行
fn unfold_lines(feed: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in feed.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            Some(rest) if !lines.is_empty() => {
                if let Some(last) = lines.last_mut() {
                    last.push_str(rest);
                }
            }
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// `NAME;PARAM=x:VALUE` -> (大写 NAME, VALUE)
fn split_property(line: &str) -> Option<(String, &str)> {
    let colon = line.find(':')?;
    let head = &line[..colon];
    let value = &line[colon + 1..];
    let name = head.split(';').next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

/// 取 DTSTART 值的日期部分（`20240101` 或 `20240101T090000Z`）
fn parse_all_day_date(value: &str) -> Option<NaiveDate> {
    let digits = value.get(..8)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(rest) = value.get(8..) {
        if !rest.is_empty() && !rest.starts_with('T') {
            return None;
        }
    }
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20241225\r\n\
SUMMARY:Christmas Day\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20240101\r\n\
SUMMARY;LANGUAGE=en-us:New Year's\r\n\x20\x20Day\r\n\
BEGIN:VALARM\r\n\
DTSTART:19990101\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:not-a-date\r\n\
SUMMARY:Broken\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20240615T080000Z\r\n\
SUMMARY:Midsummer\\, observed\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sample_events() -> Vec<CalendarEvent> {
        vec![
            CalendarEvent::new(date(2024, 1, 1), "New Year"),
            CalendarEvent::new(date(2024, 6, 15), "Midsummer"),
            CalendarEvent::new(date(2024, 12, 25), "Christmas"),
        ]
    }

    #[test]
    fn test_parse_keeps_feed_order_and_skips_malformed() {
        let events = parse_calendar(FEED);
        assert_eq!(
            events,
            vec![
                CalendarEvent::new(date(2024, 12, 25), "Christmas Day"),
                CalendarEvent::new(date(2024, 1, 1), "New Year's Day"),
                CalendarEvent::new(date(2024, 6, 15), "Midsummer, observed"),
            ]
        );
    }

    #[test]
    fn test_after_date_with_max_count() {
        let filter = HolidayFilter {
            after: Some(utc("2024-02-01T00:00:00Z")),
            max_count: Some(1),
            ..Default::default()
        };
        assert_eq!(filter_events(&sample_events(), &filter), "2024-06-15: Midsummer");
    }

    #[test]
    fn test_before_date() {
        let filter = HolidayFilter {
            before: Some(utc("2024-06-15T00:00:00Z")),
            ..Default::default()
        };
        assert_eq!(
            filter_events(&sample_events(), &filter),
            "2024-01-01: New Year\n2024-06-15: Midsummer"
        );
    }

    #[test]
    fn test_unsorted_feed_is_not_assumed_sorted() {
        let mut events = sample_events();
        events.reverse();
        let filter = HolidayFilter {
            after: Some(utc("2024-02-01T00:00:00Z")),
            ..Default::default()
        };
        assert_eq!(
            filter_events(&events, &filter),
            "2024-12-25: Christmas\n2024-06-15: Midsummer"
        );
    }

    #[test]
    fn test_zero_max_count_means_unbounded_and_empty_result() {
        let filter = HolidayFilter {
            max_count: Some(0),
            ..Default::default()
        };
        assert_eq!(filter_events(&sample_events(), &filter).lines().count(), 3);

        let none = HolidayFilter {
            after: Some(utc("2025-01-01T00:00:00Z")),
            ..Default::default()
        };
        assert_eq!(filter_events(&sample_events(), &none), "");
    }
}
