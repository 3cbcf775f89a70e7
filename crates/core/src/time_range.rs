//! Natural-language time phrases ("yesterday", "past 3 hours", "since
//! monday", "from May 1 to May 5") resolved into concrete UTC windows.
//!
//! Parsing is split in two: [`TimeExpression::recognize`] is a pure token
//! match, and [`TimeExpression::resolve`] anchors the expression to a
//! reference instant. Absolute dates ("June 3", "3rd of June 2025",
//! "6/3/2025") are handed to `chrono-english` with US day order. All calendar
//! arithmetic happens in UTC.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc, Weekday};
use chrono_english::{parse_date_string, Dialect};
use thiserror::Error;

use crate::domain::context::TimeWindow;

const MAX_PHRASE_TOKENS: usize = 9;
const FILLER_TOKENS: &[&str] = &["from", "in", "during", "over", "the", "for", "on", "of"];
const RANGE_SEPARATORS: &[&str] = &["to", "until", "till", "through", "thru"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("time phrase is empty")]
    Empty,
    #[error("could not parse time expression: \"{0}\"")]
    Unrecognized(String),
    #[error("time expression \"{0}\" is out of range")]
    OutOfRange(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalendarPeriod {
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayPart {
    Morning,
    Afternoon,
    Evening,
    Night,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeExpression {
    Today,
    Yesterday,
    Tomorrow,
    PartOfToday(DayPart),
    CurrentPeriod(CalendarPeriod),
    PreviousPeriod(CalendarPeriod),
    Trailing { amount: u32, unit: TimeUnit },
    Ago { amount: u32, unit: TimeUnit },
    Weekday { day: Weekday, strictly_before_today: bool },
    /// A single calendar day, kept as normalized text for `chrono-english`.
    CalendarDate(String),
    Recent,
    /// From the start of the inner expression up to now.
    Since(Box<TimeExpression>),
    /// From the start of the first expression to the end of the second.
    Between(Box<TimeExpression>, Box<TimeExpression>),
}

impl TimeExpression {
    pub fn recognize(phrase: &str) -> Result<Self, TimeRangeError> {
        let tokens = tokenize(phrase);
        if strip_filler(&tokens).is_empty() {
            return Err(TimeRangeError::Empty);
        }
        match_phrase(&tokens)
            .ok_or_else(|| TimeRangeError::Unrecognized(phrase.trim().to_string()))
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let today = start_of_day(now.date_naive());
        let window = match self {
            Self::Today => TimeWindow::new(today, now),
            Self::Yesterday => TimeWindow::new(today - Duration::days(1), today),
            Self::Tomorrow => {
                TimeWindow::new(today + Duration::days(1), today + Duration::days(2))
            }
            Self::PartOfToday(part) => {
                let (from_hour, to_hour) = match *part {
                    DayPart::Morning => (0, 12),
                    DayPart::Afternoon => (12, 17),
                    DayPart::Evening => (17, 21),
                    DayPart::Night => (18, 24),
                };
                TimeWindow::new(
                    today + Duration::hours(from_hour),
                    today + Duration::hours(to_hour),
                )
            }
            Self::CurrentPeriod(period) => TimeWindow::new(period_start(*period, now)?, now),
            Self::PreviousPeriod(period) => {
                let current = period_start(*period, now)?;
                TimeWindow::new(previous_period_start(*period, current)?, current)
            }
            Self::Trailing { amount, unit } => {
                TimeWindow::new(shift_back(now, *amount, *unit)?, now)
            }
            Self::Ago { amount, unit } => {
                let instant = shift_back(now, *amount, *unit)?;
                match unit {
                    TimeUnit::Minute | TimeUnit::Hour => TimeWindow::new(instant, now),
                    _ => {
                        let day = start_of_day(instant.date_naive());
                        TimeWindow::new(day, day + Duration::days(1))
                    }
                }
            }
            Self::Weekday { day, strictly_before_today } => {
                let current = now.weekday().num_days_from_monday() as i64;
                let target = day.num_days_from_monday() as i64;
                let mut back = (current - target).rem_euclid(7);
                if back == 0 && *strictly_before_today {
                    back = 7;
                }
                let start = today - Duration::days(back);
                TimeWindow::new(start, start + Duration::days(1))
            }
            Self::CalendarDate(text) => {
                let dated = with_reference_year(text, now.year());
                let parsed = parse_date_string(&dated, now, Dialect::Us).ok()?;
                let start = start_of_day(parsed.date_naive());
                TimeWindow::new(start, start + Duration::days(1))
            }
            Self::Recent => TimeWindow::trailing(now, 24),
            Self::Since(from) => {
                let start = from.resolve(now)?.start;
                if start > now {
                    return None;
                }
                TimeWindow::new(start, now)
            }
            Self::Between(from, to) => {
                let start = from.resolve(now)?.start;
                let end = to.resolve(now)?.end;
                if start > end {
                    return None;
                }
                TimeWindow::new(start, end)
            }
        };
        Some(window)
    }
}

/// Parses `phrase` relative to `now`.
pub fn parse_time_phrase(phrase: &str, now: DateTime<Utc>) -> Result<TimeWindow, TimeRangeError> {
    TimeExpression::recognize(phrase)?
        .resolve(now)
        .ok_or_else(|| TimeRangeError::OutOfRange(phrase.trim().to_string()))
}

/// Finds the first time phrase embedded in free text, preferring the longest
/// match at each position. Returns the phrase as normalized tokens.
///
/// A filler word only starts a phrase when it opens a range ("from May 1 to
/// May 5"); otherwise the phrase begins after it.
pub fn find_time_phrase(text: &str) -> Option<String> {
    let tokens = tokenize(text);
    for start in 0..tokens.len() {
        let opens_with_filler = FILLER_TOKENS.contains(&tokens[start].as_str());
        let longest = MAX_PHRASE_TOKENS.min(tokens.len() - start);
        for length in (1..=longest).rev() {
            let window = &tokens[start..start + length];
            match match_phrase(window) {
                Some(TimeExpression::Between(..)) => return Some(window.join(" ")),
                Some(_) if !opens_with_filler => return Some(window.join(" ")),
                _ => {}
            }
        }
    }
    None
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase().replace("'s", "").replace("’s", "");
    let mut sanitized = String::with_capacity(lowered.len());
    for character in lowered.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '-' | '/') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '-' || c == '/'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_filler(tokens: &[String]) -> &[String] {
    let skip = tokens.iter().take_while(|token| FILLER_TOKENS.contains(&token.as_str())).count();
    &tokens[skip..]
}

/// Range forms first ("since X", "from X to Y", "between X and Y"), then a
/// single expression after any leading filler.
fn match_phrase(tokens: &[String]) -> Option<TimeExpression> {
    let (first, rest) = tokens.split_first()?;
    match first.as_str() {
        "since" => {
            let from = match_tokens(strip_filler(rest))?;
            return Some(TimeExpression::Since(Box::new(from)));
        }
        "between" => return match_range(rest, &["and"]),
        "from" => {
            if let Some(range) = match_range(rest, RANGE_SEPARATORS) {
                return Some(range);
            }
        }
        _ => {}
    }
    let meaningful = strip_filler(tokens);
    if meaningful.is_empty() {
        return None;
    }
    match_tokens(meaningful)
}

fn match_range(tokens: &[String], separators: &[&str]) -> Option<TimeExpression> {
    tokens.iter().enumerate().find_map(|(index, token)| {
        if index == 0 || !separators.contains(&token.as_str()) {
            return None;
        }
        let from = match_tokens(strip_filler(&tokens[..index]))?;
        let to = match_tokens(strip_filler(&tokens[index + 1..]))?;
        Some(TimeExpression::Between(Box::new(from), Box::new(to)))
    })
}

fn match_tokens(tokens: &[String]) -> Option<TimeExpression> {
    if tokens.is_empty() {
        return None;
    }
    let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["today"] | ["earlier", "today"] => Some(TimeExpression::Today),
        ["yesterday"] => Some(TimeExpression::Yesterday),
        ["tomorrow"] => Some(TimeExpression::Tomorrow),
        ["recent"] | ["recently"] | ["latest"] => Some(TimeExpression::Recent),
        ["tonight"] => Some(TimeExpression::PartOfToday(DayPart::Night)),
        ["this", part] => parse_day_part(part)
            .map(TimeExpression::PartOfToday)
            .or_else(|| parse_period(part).map(TimeExpression::CurrentPeriod)),
        ["last", word] | ["previous", word] => {
            if let Some(period) = parse_period(word) {
                Some(TimeExpression::PreviousPeriod(period))
            } else if let Some(unit) = parse_unit(word) {
                Some(TimeExpression::Trailing { amount: 1, unit })
            } else {
                parse_weekday(word)
                    .map(|day| TimeExpression::Weekday { day, strictly_before_today: true })
            }
        }
        ["earlier", "this", period] => parse_period(period).map(TimeExpression::CurrentPeriod),
        ["past", unit] | ["this", "past", unit] => {
            parse_unit(unit).map(|unit| TimeExpression::Trailing { amount: 1, unit })
        }
        ["past" | "last", amount, unit] => Some(TimeExpression::Trailing {
            amount: parse_amount(amount)?,
            unit: parse_unit(unit)?,
        }),
        [amount, unit, "ago"] => {
            Some(TimeExpression::Ago { amount: parse_amount(amount)?, unit: parse_unit(unit)? })
        }
        [word] => parse_weekday(word)
            .map(|day| TimeExpression::Weekday { day, strictly_before_today: false })
            .or_else(|| calendar_date(&words).map(TimeExpression::CalendarDate)),
        _ => calendar_date(&words).map(TimeExpression::CalendarDate),
    }
}

/// Recognizes the shape of an absolute date and normalizes it for
/// `chrono-english`: "june 3rd" and "3 of june" become "3 june", optionally
/// followed by a year. Numeric dates ("2025-06-03", "6/3/2025") pass through.
fn calendar_date(words: &[&str]) -> Option<String> {
    let words: Vec<&str> = words.iter().copied().filter(|word| *word != "of").collect();
    match words.as_slice() {
        [numeric] if is_numeric_date(numeric) => Some((*numeric).to_string()),
        [first, second] => {
            let (day, month) = day_and_month(first, second)?;
            Some(format!("{day} {month}"))
        }
        [first, second, year] => {
            let (day, month) = day_and_month(first, second)?;
            let year = parse_year(year)?;
            Some(format!("{day} {month} {year}"))
        }
        _ => None,
    }
}

fn day_and_month(first: &str, second: &str) -> Option<(u32, &'static str)> {
    if let Some(month) = parse_month(first) {
        return Some((parse_day(second)?, month));
    }
    Some((parse_day(first)?, parse_month(second)?))
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))
        .unwrap_or(token);
    let day = digits.parse::<u32>().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn parse_year(token: &str) -> Option<i32> {
    if token.len() != 4 {
        return None;
    }
    token.parse::<i32>().ok()
}

fn parse_month(token: &str) -> Option<&'static str> {
    match token {
        "january" | "jan" => Some("january"),
        "february" | "feb" => Some("february"),
        "march" | "mar" => Some("march"),
        "april" | "apr" => Some("april"),
        "may" => Some("may"),
        "june" | "jun" => Some("june"),
        "july" | "jul" => Some("july"),
        "august" | "aug" => Some("august"),
        "september" | "sep" | "sept" => Some("september"),
        "october" | "oct" => Some("october"),
        "november" | "nov" => Some("november"),
        "december" | "dec" => Some("december"),
        _ => None,
    }
}

/// Dates written without a year fall in the reference year.
fn with_reference_year(text: &str, year: i32) -> String {
    if text.contains('/') && text.matches('/').count() == 1 {
        return format!("{text}/{year}");
    }
    if text.split_whitespace().count() == 2 {
        return format!("{text} {year}");
    }
    text.to_string()
}

/// `YYYY-MM-DD`, `M/D` or `M/D/YYYY`.
fn is_numeric_date(token: &str) -> bool {
    let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    let dashed: Vec<&str> = token.split('-').collect();
    if let [year, month, day] = dashed.as_slice() {
        return year.len() == 4 && all_digits(*year) && all_digits(*month) && all_digits(*day);
    }
    let slashed: Vec<&str> = token.split('/').collect();
    matches!(slashed.len(), 2 | 3)
        && slashed.iter().all(|part| all_digits(*part))
        && slashed[..2].iter().all(|part| part.len() <= 2)
}

fn parse_amount(token: &str) -> Option<u32> {
    let amount = match token {
        "a" | "an" | "one" => 1,
        "two" | "couple" => 2,
        "three" | "few" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => digits.parse::<u32>().ok()?,
    };
    (amount > 0).then_some(amount)
}

fn parse_unit(token: &str) -> Option<TimeUnit> {
    match token {
        "minute" | "minutes" | "min" | "mins" => Some(TimeUnit::Minute),
        "hour" | "hours" | "hr" | "hrs" => Some(TimeUnit::Hour),
        "day" | "days" => Some(TimeUnit::Day),
        "week" | "weeks" => Some(TimeUnit::Week),
        "month" | "months" => Some(TimeUnit::Month),
        "year" | "years" => Some(TimeUnit::Year),
        _ => None,
    }
}

fn parse_period(token: &str) -> Option<CalendarPeriod> {
    match token {
        "week" => Some(CalendarPeriod::Week),
        "month" => Some(CalendarPeriod::Month),
        "quarter" => Some(CalendarPeriod::Quarter),
        "year" => Some(CalendarPeriod::Year),
        _ => None,
    }
}

fn parse_day_part(token: &str) -> Option<DayPart> {
    match token {
        "morning" => Some(DayPart::Morning),
        "afternoon" => Some(DayPart::Afternoon),
        "evening" => Some(DayPart::Evening),
        _ => None,
    }
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn period_start(period: CalendarPeriod, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = now.date_naive();
    let start = match period {
        CalendarPeriod::Week => {
            date - Duration::days(date.weekday().num_days_from_monday() as i64)
        }
        CalendarPeriod::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
        CalendarPeriod::Quarter => {
            let first_month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), first_month, 1)?
        }
        CalendarPeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
    };
    Some(start_of_day(start))
}

fn previous_period_start(
    period: CalendarPeriod,
    current_start: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match period {
        CalendarPeriod::Week => Some(current_start - Duration::days(7)),
        CalendarPeriod::Month => current_start.checked_sub_months(Months::new(1)),
        CalendarPeriod::Quarter => current_start.checked_sub_months(Months::new(3)),
        CalendarPeriod::Year => current_start.checked_sub_months(Months::new(12)),
    }
}

fn shift_back(now: DateTime<Utc>, amount: u32, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let amount_i64 = i64::from(amount);
    match unit {
        TimeUnit::Minute => now.checked_sub_signed(Duration::try_minutes(amount_i64)?),
        TimeUnit::Hour => now.checked_sub_signed(Duration::try_hours(amount_i64)?),
        TimeUnit::Day => now.checked_sub_signed(Duration::try_days(amount_i64)?),
        TimeUnit::Week => now.checked_sub_signed(Duration::try_weeks(amount_i64)?),
        TimeUnit::Month => now.checked_sub_months(Months::new(amount)),
        TimeUnit::Year => now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
    }
}
