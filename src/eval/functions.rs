//! Scalar function library
//!
//! String, numeric, date, and logic functions callable from value
//! expressions. Unknown function names and wrong arities are structural
//! errors; data-level problems (unparseable dates, bad regex patterns,
//! non-numeric input) are recorded as validation errors and evaluate to
//! null.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use regex::Regex;
use serde_json::Value;

use crate::exec::{ExecError, ExecResult, ExecutionContext};
use crate::validation::ValidationError;

use super::compare::{as_number, compare_values, number_value, type_name};

/// Dispatches a scalar function call by case-insensitive name.
pub fn call_scalar(
    ctx: &mut ExecutionContext,
    name: &str,
    args: &[Value],
) -> ExecResult<Value> {
    match name.to_lowercase().as_str() {
        // String functions
        "concat" => Ok(concat(args)),
        "substring" => substring(ctx, name, args),
        "upper" => unary_string(name, args, |s| s.to_uppercase()),
        "lower" => unary_string(name, args, |s| s.to_lowercase()),
        "trim" => unary_string(name, args, |s| s.trim().to_string()),
        "length" => {
            let [value] = expect_args::<1>(name, args)?;
            Ok(match value {
                Value::Null => Value::Null,
                other => Value::from(stringify(other).chars().count()),
            })
        }
        "regex_replace" => regex_replace(ctx, name, args),

        // Numeric functions
        "abs" => unary_number(ctx, name, args, f64::abs),
        "ceil" => unary_number(ctx, name, args, f64::ceil),
        "floor" => unary_number(ctx, name, args, f64::floor),
        "round" => round(ctx, name, args),
        "power" => binary_number(ctx, name, args, f64::powf),
        "sqrt" => unary_number(ctx, name, args, f64::sqrt),

        // Date functions
        "now" => {
            expect_args::<0>(name, args)?;
            Ok(Value::String(Utc::now().to_rfc3339()))
        }
        "date_trunc" => date_trunc(ctx, name, args),
        "date_extract" => date_extract(ctx, name, args),
        "date_add" => date_shift(ctx, name, args, 1),
        "date_sub" => date_shift(ctx, name, args, -1),

        // Logic functions
        "coalesce" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        "nullif" => {
            let [a, b] = expect_args::<2>(name, args)?;
            if compare_values(a, b) == std::cmp::Ordering::Equal {
                Ok(Value::Null)
            } else {
                Ok(a.clone())
            }
        }
        "greatest" => Ok(extremum(args, std::cmp::Ordering::Greater)),
        "least" => Ok(extremum(args, std::cmp::Ordering::Less)),

        other => Err(ExecError::UnknownFunction(other.to_string())),
    }
}

fn expect_args<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> ExecResult<&'a [Value; N]> {
    args.try_into().map_err(|_| ExecError::FunctionArity {
        function: name.to_string(),
        expected: match N {
            0 => "0",
            1 => "1",
            2 => "2",
            3 => "3",
            _ => "more",
        },
        actual: args.len(),
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn concat(args: &[Value]) -> Value {
    let joined: String = args
        .iter()
        .filter(|v| !v.is_null())
        .map(stringify)
        .collect();
    Value::String(joined)
}

fn unary_string(
    name: &str,
    args: &[Value],
    apply: impl Fn(&str) -> String,
) -> ExecResult<Value> {
    let [value] = expect_args::<1>(name, args)?;
    Ok(match value {
        Value::Null => Value::Null,
        other => Value::String(apply(&stringify(other))),
    })
}

fn substring(ctx: &mut ExecutionContext, name: &str, args: &[Value]) -> ExecResult<Value> {
    if args.len() != 2 && args.len() != 3 {
        return Err(ExecError::FunctionArity {
            function: name.to_string(),
            expected: "2 or 3",
            actual: args.len(),
        });
    }
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let text = stringify(&args[0]);
    let Some(start) = as_number(&args[1]) else {
        ctx.record_error(ValidationError::type_mismatch(
            "function.substring",
            "number",
            type_name(&args[1]),
        ));
        return Ok(Value::Null);
    };
    // 1-based start; out-of-range clamps to the string bounds
    let chars: Vec<char> = text.chars().collect();
    let from = (start.max(1.0) as usize).saturating_sub(1).min(chars.len());
    let taken = match args.get(2) {
        Some(len_value) => match as_number(len_value) {
            Some(len) => (len.max(0.0) as usize).min(chars.len() - from),
            None => {
                ctx.record_error(ValidationError::type_mismatch(
                    "function.substring",
                    "number",
                    type_name(len_value),
                ));
                return Ok(Value::Null);
            }
        },
        None => chars.len() - from,
    };
    Ok(Value::String(chars[from..from + taken].iter().collect()))
}

fn regex_replace(
    ctx: &mut ExecutionContext,
    name: &str,
    args: &[Value],
) -> ExecResult<Value> {
    let [text, pattern, replacement] = expect_args::<3>(name, args)?;
    if text.is_null() {
        return Ok(Value::Null);
    }
    let pattern_text = stringify(pattern);
    let regex = match Regex::new(&pattern_text) {
        Ok(regex) => regex,
        Err(err) => {
            ctx.record_error(ValidationError::new(
                "function.regex_replace",
                format!("invalid pattern '{}': {}", pattern_text, err),
            ));
            return Ok(Value::Null);
        }
    };
    Ok(Value::String(
        regex
            .replace_all(&stringify(text), stringify(replacement).as_str())
            .into_owned(),
    ))
}

fn numeric_arg(ctx: &mut ExecutionContext, name: &str, value: &Value) -> Option<f64> {
    if value.is_null() {
        return None;
    }
    match as_number(value) {
        Some(n) => Some(n),
        None => {
            ctx.record_error(ValidationError::type_mismatch(
                format!("function.{}", name),
                "number",
                type_name(value),
            ));
            None
        }
    }
}

fn unary_number(
    ctx: &mut ExecutionContext,
    name: &str,
    args: &[Value],
    apply: impl Fn(f64) -> f64,
) -> ExecResult<Value> {
    let [value] = expect_args::<1>(name, args)?;
    Ok(numeric_arg(ctx, name, value)
        .map(|n| number_value(apply(n)))
        .unwrap_or(Value::Null))
}

fn binary_number(
    ctx: &mut ExecutionContext,
    name: &str,
    args: &[Value],
    apply: impl Fn(f64, f64) -> f64,
) -> ExecResult<Value> {
    let [a, b] = expect_args::<2>(name, args)?;
    match (numeric_arg(ctx, name, a), numeric_arg(ctx, name, b)) {
        (Some(x), Some(y)) => Ok(number_value(apply(x, y))),
        _ => Ok(Value::Null),
    }
}

fn round(ctx: &mut ExecutionContext, name: &str, args: &[Value]) -> ExecResult<Value> {
    if args.len() == 1 {
        return unary_number(ctx, name, args, f64::round);
    }
    let [value, digits] = expect_args::<2>(name, args)?;
    match (numeric_arg(ctx, name, value), numeric_arg(ctx, name, digits)) {
        (Some(n), Some(d)) => {
            let factor = 10f64.powi(d as i32);
            Ok(number_value((n * factor).round() / factor))
        }
        _ => Ok(Value::Null),
    }
}

fn extremum(args: &[Value], keep: std::cmp::Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in args.iter().filter(|v| !v.is_null()) {
        best = match best {
            None => Some(value),
            Some(current) => {
                if compare_values(value, current) == keep {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

/// Parses a date value: RFC 3339 first, then a bare `YYYY-MM-DD`.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn date_arg(
    ctx: &mut ExecutionContext,
    name: &str,
    value: &Value,
) -> Option<DateTime<Utc>> {
    if value.is_null() {
        return None;
    }
    match parse_date(value) {
        Some(date) => Some(date),
        None => {
            ctx.record_error(ValidationError::type_mismatch(
                format!("function.{}", name),
                "date",
                type_name(value),
            ));
            None
        }
    }
}

fn unit_arg(ctx: &mut ExecutionContext, name: &str, value: &Value) -> Option<String> {
    let unit = stringify(value).to_lowercase();
    match unit.as_str() {
        "year" | "month" | "day" | "hour" | "minute" | "second" => Some(unit),
        other => {
            ctx.record_error(ValidationError::new(
                format!("function.{}", name),
                format!("unknown date unit '{}'", other),
            ));
            None
        }
    }
}

fn date_trunc(ctx: &mut ExecutionContext, name: &str, args: &[Value]) -> ExecResult<Value> {
    let [unit, date] = expect_args::<2>(name, args)?;
    let (Some(unit), Some(date)) = (unit_arg(ctx, name, unit), date_arg(ctx, name, date))
    else {
        return Ok(Value::Null);
    };

    let naive = date.naive_utc();
    let truncated = match unit.as_str() {
        "year" => NaiveDate::from_ymd_opt(naive.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        "month" => NaiveDate::from_ymd_opt(naive.year(), naive.month(), 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        "day" => naive.date().and_hms_opt(0, 0, 0),
        "hour" => naive.date().and_hms_opt(naive.hour(), 0, 0),
        "minute" => naive.date().and_hms_opt(naive.hour(), naive.minute(), 0),
        _ => naive
            .date()
            .and_hms_opt(naive.hour(), naive.minute(), naive.second()),
    };
    Ok(truncated
        .map(|naive| Value::String(Utc.from_utc_datetime(&naive).to_rfc3339()))
        .unwrap_or(Value::Null))
}

fn date_extract(ctx: &mut ExecutionContext, name: &str, args: &[Value]) -> ExecResult<Value> {
    let [unit, date] = expect_args::<2>(name, args)?;
    let (Some(unit), Some(date)) = (unit_arg(ctx, name, unit), date_arg(ctx, name, date))
    else {
        return Ok(Value::Null);
    };

    let part = match unit.as_str() {
        "year" => date.year() as i64,
        "month" => date.month() as i64,
        "day" => date.day() as i64,
        "hour" => date.hour() as i64,
        "minute" => date.minute() as i64,
        _ => date.second() as i64,
    };
    Ok(Value::from(part))
}

fn date_shift(
    ctx: &mut ExecutionContext,
    name: &str,
    args: &[Value],
    sign: i64,
) -> ExecResult<Value> {
    let [date, amount, unit] = expect_args::<3>(name, args)?;
    let (Some(date), Some(amount), Some(unit)) = (
        date_arg(ctx, name, date),
        numeric_arg(ctx, name, amount),
        unit_arg(ctx, name, unit),
    ) else {
        return Ok(Value::Null);
    };

    let amount = amount as i64 * sign;
    let shifted = match unit.as_str() {
        "year" | "month" => {
            let months = if unit == "year" { amount * 12 } else { amount };
            if months >= 0 {
                date.checked_add_months(Months::new(months as u32))
            } else {
                date.checked_sub_months(Months::new((-months) as u32))
            }
        }
        "day" => date.checked_add_signed(Duration::days(amount)),
        "hour" => date.checked_add_signed(Duration::hours(amount)),
        "minute" => date.checked_add_signed(Duration::minutes(amount)),
        _ => date.checked_add_signed(Duration::seconds(amount)),
    };
    Ok(shifted
        .map(|d| Value::String(d.to_rfc3339()))
        .unwrap_or(Value::Null))
}
