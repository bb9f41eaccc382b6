//! Pattern-free date parsing.
//!
//! Input is split into numbers, words, and separators. Month and weekday
//! names, `T`/`Z` markers, UTC offsets, am/pm, compact `YYYYMMDD`, and clock
//! times are recognised; the remaining numbers are assigned to day, month, and
//! year by magnitude, with the [`ParseOptions`] preferences breaking ties.
//! Strict mode rejects any word it does not understand, fuzzy mode skips it.
//! A value with no year is never accepted.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MONTHS: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Words allowed between date parts even in strict mode.
const FILLER_WORDS: &[&str] = &["at", "on", "of", "the", "and", "t", "z", "utc", "gmt"];

const ORDINAL_SUFFIXES: &[&str] = &["st", "nd", "rd", "th"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Read an ambiguous leading number as the year.
    pub year_first: bool,
    /// Read an ambiguous day/month pair as day first.
    pub day_first: bool,
    /// Skip words and symbols that carry no date meaning.
    pub fuzzy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(String),
    Word(String),
    Sep(char),
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            tokens.push(Token::Number(digits));
        } else if c.is_alphabetic() {
            let mut word = String::new();
            while let Some(&w) = chars.peek().filter(|w| w.is_alphabetic()) {
                word.extend(w.to_lowercase());
                chars.next();
            }
            tokens.push(Token::Word(word));
        } else {
            chars.next();
            if c.is_whitespace() {
                if tokens.last() != Some(&Token::Sep(' ')) {
                    tokens.push(Token::Sep(' '));
                }
            } else {
                tokens.push(Token::Sep(c));
            }
        }
    }
    tokens
}

fn month_number(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    if word == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|month| *month == word || (word.len() == 3 && month.starts_with(word)))
        .map(|idx| idx as u32 + 1)
}

fn is_weekday(word: &str) -> bool {
    word.len() >= 3
        && WEEKDAYS
            .iter()
            .any(|day| *day == word || (word.len() <= 4 && day.starts_with(word)))
}

/// A bare number and how many digits it was written with.
#[derive(Debug, Clone, Copy)]
struct Part {
    value: u32,
    digits: usize,
}

impl Part {
    fn is_year(&self) -> bool {
        self.digits >= 3 || self.value > 31
    }

    fn year(&self) -> i32 {
        let value = self.value as i32;
        if self.digits <= 2 {
            if value <= 68 { 2000 + value } else { 1900 + value }
        } else {
            value
        }
    }
}

#[derive(Debug, Default)]
struct Fields {
    parts: Vec<Part>,
    month_name: Option<u32>,
    compact: Option<(i32, u32, u32)>,
    time: Option<NaiveTime>,
    time_end: Option<usize>,
    pm: Option<bool>,
}

fn number_at(tokens: &[Token], idx: usize) -> Option<&str> {
    match tokens.get(idx) {
        Some(Token::Number(digits)) => Some(digits.as_str()),
        _ => None,
    }
}

fn is_sep(tokens: &[Token], idx: usize, sep: char) -> bool {
    tokens.get(idx) == Some(&Token::Sep(sep))
}

fn meridiem(tokens: &[Token], idx: usize) -> Option<bool> {
    match tokens.get(idx) {
        Some(Token::Word(w)) if w == "am" => Some(false),
        Some(Token::Word(w)) if w == "pm" => Some(true),
        _ => None,
    }
}

/// Parses `H:M[:S[.fff]]` starting at `idx`; returns the time and the next token index.
fn parse_clock(tokens: &[Token], idx: usize) -> Option<(NaiveTime, usize)> {
    let hour = number_at(tokens, idx).filter(|d| d.len() <= 2)?;
    let minute = number_at(tokens, idx + 2).filter(|d| d.len() <= 2)?;
    let mut next = idx + 3;
    let mut second = 0u32;
    let mut nanos = 0u32;
    if is_sep(tokens, next, ':')
        && let Some(digits) = number_at(tokens, next + 1).filter(|d| d.len() <= 2)
    {
        second = digits.parse().ok()?;
        next += 2;
        if is_sep(tokens, next, '.')
            && let Some(fraction) = number_at(tokens, next + 1)
        {
            let mut padded = fraction.chars().take(9).collect::<String>();
            while padded.len() < 9 {
                padded.push('0');
            }
            nanos = padded.parse().ok()?;
            next += 2;
        }
    }
    let time = NaiveTime::from_hms_nano_opt(hour.parse().ok()?, minute.parse().ok()?, second, nanos)?;
    Some((time, next))
}

/// Skips a `+HHMM`, `+HH`, or `+HH:MM` offset body starting at `idx`.
fn skip_offset(tokens: &[Token], idx: usize) -> Option<usize> {
    let digits = number_at(tokens, idx)?;
    match digits.len() {
        4 => Some(idx + 1),
        2 if is_sep(tokens, idx + 1, ':') && number_at(tokens, idx + 2).is_some() => Some(idx + 3),
        2 => Some(idx + 1),
        _ => None,
    }
}

fn scan(tokens: &[Token], fuzzy: bool) -> Option<Fields> {
    let mut fields = Fields::default();
    let mut idx = 0usize;
    while idx < tokens.len() {
        match &tokens[idx] {
            Token::Number(digits) => {
                if is_sep(tokens, idx + 1, ':') && number_at(tokens, idx + 2).is_some() {
                    if fields.time.is_some() {
                        return None;
                    }
                    let (time, next) = parse_clock(tokens, idx)?;
                    fields.time = Some(time);
                    fields.time_end = Some(next);
                    idx = next;
                    continue;
                }
                let after_space = if is_sep(tokens, idx + 1, ' ') { idx + 2 } else { idx + 1 };
                if let Some(pm) = meridiem(tokens, after_space).filter(|_| digits.len() <= 2) {
                    if fields.time.is_some() {
                        return None;
                    }
                    fields.time = NaiveTime::from_hms_opt(digits.parse().ok()?, 0, 0);
                    fields.pm = Some(pm);
                    idx = after_space + 1;
                    continue;
                }
                match digits.len() {
                    8 if fields.compact.is_none() => {
                        fields.compact = Some((
                            digits[..4].parse().ok()?,
                            digits[4..6].parse().ok()?,
                            digits[6..].parse().ok()?,
                        ));
                    }
                    1 | 2 | 4 => fields.parts.push(Part {
                        value: digits.parse().ok()?,
                        digits: digits.len(),
                    }),
                    _ if fuzzy => {}
                    _ => return None,
                }
                idx += 1;
                if let Some(Token::Word(suffix)) = tokens.get(idx)
                    && ORDINAL_SUFFIXES.contains(&suffix.as_str())
                {
                    idx += 1;
                }
            }
            Token::Word(word) => {
                if let Some(month) = month_number(word) {
                    if fields.month_name.is_some() {
                        return None;
                    }
                    fields.month_name = Some(month);
                } else if word == "am" || word == "pm" {
                    fields.time?;
                    fields.pm = Some(word == "pm");
                } else if !(is_weekday(word) || FILLER_WORDS.contains(&word.as_str()) || fuzzy) {
                    return None;
                }
                idx += 1;
            }
            Token::Sep(sep) => {
                let follows_time = fields.time_end == Some(idx)
                    || (fields.time_end == Some(idx.saturating_sub(1))
                        && idx > 0
                        && is_sep(tokens, idx - 1, ' '));
                if (*sep == '+' || *sep == '-') && follows_time {
                    idx = skip_offset(tokens, idx + 1)?;
                    continue;
                }
                if !(matches!(*sep, ' ' | '-' | '/' | '.' | ',') || fuzzy) {
                    return None;
                }
                idx += 1;
            }
        }
    }
    Some(fields)
}

/// Splits an ambiguous pair into (month, day).
fn month_day(first: Part, second: Part, day_first: bool) -> (u32, u32) {
    if first.value > 12 {
        (second.value, first.value)
    } else if second.value > 12 || !day_first {
        (first.value, second.value)
    } else {
        (second.value, first.value)
    }
}

fn resolve_date(fields: &Fields, options: ParseOptions) -> Option<NaiveDate> {
    if let Some((year, month, day)) = fields.compact {
        if !fields.parts.is_empty() || fields.month_name.is_some() {
            return None;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let (year, month, day) = if let Some(month) = fields.month_name {
        match fields.parts.as_slice() {
            [only] if only.is_year() => (only.year(), month, 1),
            [a, b] => match (a.is_year(), b.is_year()) {
                (true, false) => (a.year(), month, b.value),
                (false, true) => (b.year(), month, a.value),
                (false, false) if options.year_first => (a.year(), month, b.value),
                (false, false) => (b.year(), month, a.value),
                (true, true) => return None,
            },
            _ => return None,
        }
    } else {
        match fields.parts.as_slice() {
            [a, b, c] => {
                let years = [a, b, c].iter().filter(|p| p.is_year()).count();
                if years > 1 {
                    return None;
                }
                if a.is_year() || (years == 0 && options.year_first) {
                    let (m, d) = month_day(*b, *c, options.year_first && options.day_first);
                    (a.year(), m, d)
                } else if b.is_year() {
                    let (m, d) = month_day(*a, *c, options.day_first);
                    (b.year(), m, d)
                } else {
                    let (m, d) = month_day(*a, *b, options.day_first);
                    (c.year(), m, d)
                }
            }
            [a, b] if a.is_year() && !b.is_year() => (a.year(), b.value, 1),
            [a, b] if b.is_year() && !a.is_year() => (b.year(), a.value, 1),
            _ => return None,
        }
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn apply_meridiem(time: NaiveTime, pm: Option<bool>) -> Option<NaiveTime> {
    let Some(pm) = pm else {
        return Some(time);
    };
    let hour = time.hour();
    if hour == 0 || hour > 12 {
        return None;
    }
    let hour = match (pm, hour) {
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, 12) => 0,
        (false, h) => h,
    };
    time.with_hour(hour)
}

pub fn parse(input: &str, options: ParseOptions) -> Option<NaiveDateTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let tokens = tokenize(trimmed);
    let fields = scan(&tokens, options.fuzzy)?;
    let date = resolve_date(&fields, options)?;
    let time = match fields.time {
        Some(time) => apply_meridiem(time, fields.pm)?,
        None => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}
