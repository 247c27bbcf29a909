//! Compiles a [`Strategy`]'s rule text into an executable [`Operator`].
//!
//! Two pieces of rule text are parsed:
//!
//! * `field_transform` selects the value to judge: `select(field)`,
//!   `rangeselect(field,min,max,range_field,default)`,
//!   `rangeand(range_field,min,max,...,field)` and
//!   `rangeor(range_field,min,max,...,field)`.
//! * `func` names the calculation and its window: `all(#3)`, `diff(#5)`,
//!   `have(#10,3)`.
//!
//! Keywords are resolved once here; evaluation never compares strings.

use crate::calc::{calculate_limit, CalcKind, Calculation};
use crate::compare::{parse_tag_filters, CompareOp, TagPredicate};
use crate::error::{self, CalcError, JudgeError, ParseError};
use std::collections::HashMap;
use vigil_common::types::{Metric, Strategy};

/// A `(field, min, max)` range test used by `rangeand` / `rangeor`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRange {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Select {
        field: String,
    },
    RangeSelect {
        field: String,
        min: f64,
        max: f64,
        range_field: String,
        default: f64,
    },
    RangeXor {
        is_or: bool,
        field: String,
        ranges: Vec<FieldRange>,
    },
}

impl Transform {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (name, args) = split_call(text)?;
        match name.as_str() {
            "select" => {
                if args.len() != 1 || args[0].is_empty() {
                    return Err(ParseError::Arity {
                        name: "select",
                        expected: "1",
                        got: args.len(),
                    });
                }
                Ok(Self::Select {
                    field: args[0].clone(),
                })
            }
            "rangeselect" => {
                if args.len() != 5 {
                    return Err(ParseError::Arity {
                        name: "rangeselect",
                        expected: "5",
                        got: args.len(),
                    });
                }
                Ok(Self::RangeSelect {
                    field: args[0].clone(),
                    min: parse_number(&args[1])?,
                    max: parse_number(&args[2])?,
                    range_field: args[3].clone(),
                    default: parse_number(&args[4])?,
                })
            }
            "rangeand" | "rangeor" => {
                let is_or = name == "rangeor";
                if args.len() < 4 || (args.len() - 1) % 3 != 0 {
                    return Err(ParseError::Arity {
                        name: if is_or { "rangeor" } else { "rangeand" },
                        expected: "3k+1",
                        got: args.len(),
                    });
                }
                let (triples, field) = args.split_at(args.len() - 1);
                let ranges = triples
                    .chunks(3)
                    .map(|t| {
                        Ok(FieldRange {
                            field: t[0].clone(),
                            min: parse_number(&t[1])?,
                            max: parse_number(&t[2])?,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                Ok(Self::RangeXor {
                    is_or,
                    field: field[0].clone(),
                    ranges,
                })
            }
            other => Err(ParseError::UnknownTransform(other.to_string())),
        }
    }

    /// Extracts the value to judge from a metric.
    pub fn apply(&self, metric: &Metric) -> error::Result<f64> {
        match self {
            Self::Select { field } => read_field(metric, field),
            Self::RangeSelect {
                field,
                min,
                max,
                range_field,
                default,
            } => {
                let v = read_field(metric, field)?;
                if v >= *min && v <= *max {
                    read_field(metric, range_field)
                } else {
                    Ok(*default)
                }
            }
            Self::RangeXor {
                is_or: false,
                field,
                ranges,
            } => {
                for range in ranges {
                    let v = read_field(metric, &range.field)?;
                    if !range.contains(v) {
                        return Err(JudgeError::OutOfRange(range.field.clone()));
                    }
                }
                read_field(metric, field)
            }
            Self::RangeXor {
                is_or: true,
                field,
                ranges,
            } => {
                let hit = ranges
                    .iter()
                    .any(|r| metric.field(&r.field).is_some_and(|v| r.contains(v)));
                if !hit {
                    return Err(JudgeError::OutOfRange(field.clone()));
                }
                read_field(metric, field)
            }
        }
    }
}

fn read_field(metric: &Metric, field: &str) -> error::Result<f64> {
    metric
        .field(field)
        .ok_or_else(|| JudgeError::FieldMissing(field.to_string()))
}

/// Splits `name(a, b, c)` into its lowercase name and trimmed arguments.
fn split_call(text: &str) -> Result<(String, Vec<String>), ParseError> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| ParseError::Malformed(text.to_string()))?;
    let inner = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| ParseError::Malformed(text.to_string()))?;
    let name = text[..open].trim().to_lowercase();
    if name.is_empty() {
        return Err(ParseError::Malformed(text.to_string()));
    }
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(|a| a.trim().to_string()).collect()
    };
    Ok((name, args))
}

fn parse_number(s: &str) -> Result<f64, ParseError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

/// Largest configurable window, in samples.
pub const MAX_WINDOW: i64 = 100_000;

/// Calculation kind, raw window limit and extra argument of a `func`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Func {
    pub kind: CalcKind,
    pub limit: usize,
    pub extra: Option<i64>,
}

/// Parses a `func` such as `diff(#5)` or `have(#5,2)`.
///
/// The returned limit is the configured one; [`Operator::limit`] applies
/// [`calculate_limit`].
pub fn parse_func(text: &str) -> Result<Func, ParseError> {
    let normalized: String = text
        .chars()
        .map(|c| match c {
            '(' | ')' | '#' | ',' => ' ',
            c => c,
        })
        .collect();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let (name, rest) = tokens
        .split_first()
        .ok_or_else(|| ParseError::Malformed(text.to_string()))?;
    let kind: CalcKind = name.to_lowercase().parse()?;

    if rest.is_empty() || rest.len() > 2 {
        return Err(ParseError::Arity {
            name: kind.name(),
            expected: "1 or 2",
            got: rest.len(),
        });
    }
    let limit: i64 = rest[0]
        .parse()
        .map_err(|_| ParseError::InvalidNumber(rest[0].to_string()))?;
    if !(1..=MAX_WINDOW).contains(&limit) {
        return Err(ParseError::InvalidWindow(limit));
    }
    if rest.len() == 2 && kind != CalcKind::Have {
        return Err(ParseError::Arity {
            name: kind.name(),
            expected: "1",
            got: rest.len(),
        });
    }
    let extra = match rest.get(1) {
        Some(arg) => Some(
            arg.parse::<i64>()
                .map_err(|_| ParseError::InvalidNumber(arg.to_string()))?,
        ),
        None => None,
    };
    if kind == CalcKind::Have && extra.is_none() {
        return Err(ParseError::MissingArgument("have"));
    }
    Ok(Func {
        kind,
        limit: limit as usize,
        extra,
    })
}

/// The compiled, immutable form of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    transform: Transform,
    func: Func,
    limit: usize,
    compare: CompareOp,
    threshold: f64,
    tags: Vec<TagPredicate>,
}

impl Operator {
    pub fn parse(strategy: &Strategy) -> Result<Self, ParseError> {
        let transform = Transform::parse(&strategy.field_transform)?;
        let func = parse_func(&strategy.func)?;
        let compare: CompareOp = strategy.op.parse()?;
        let tags = parse_tag_filters(&strategy.tags)?;
        Ok(Self {
            transform,
            limit: calculate_limit(func.limit, func.kind),
            func,
            compare,
            threshold: strategy.right_value,
            tags,
        })
    }

    /// Raw samples required before the calculation runs.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn kind(&self) -> CalcKind {
        self.func.kind
    }

    pub fn compare(&self) -> CompareOp {
        self.compare
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn tags(&self) -> &[TagPredicate] {
        &self.tags
    }

    pub fn transform(&self, metric: &Metric) -> error::Result<f64> {
        self.transform.apply(metric)
    }

    /// Whether every tag predicate matches the resolved tag set.
    pub fn match_tags(&self, tags: &HashMap<String, String>) -> bool {
        self.tags.iter().all(|p| p.matches(tags))
    }

    /// Runs the calculation over a newest-first window of exactly
    /// [`limit`](Self::limit) samples.
    pub fn evaluate(&self, window: &[f64]) -> Result<Calculation, CalcError> {
        self.func
            .kind
            .calculate(window, self.threshold, self.compare, self.func.extra)
    }
}
