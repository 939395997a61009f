use std::cmp::Ordering;
use std::rc::Rc;

use super::FnDesc;
use crate::dispatch::{param, Bound, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError};
use crate::value::Value;

fn recv(receiver: Option<Value>) -> Rc<str> {
    match receiver {
        Some(Value::Str(s)) => s,
        _ => unreachable!("string method dispatched on non-string receiver"),
    }
}

const ARG1_STR: Signature = Signature {
    required: &[param("other", TypeSpec::Str)],
    optional: &[],
    glob: None,
    keywords: &[],
};

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "contains",
        sig: ARG1_STR,
        imp: |_, receiver, args| {
            let s = recv(receiver);
            let needle = args.arg(0).as_str().map(|n| s.contains(&**n));
            Ok(Value::Bool(needle.unwrap_or(false)))
        },
    },
    FnDesc {
        name: "endswith",
        sig: ARG1_STR,
        imp: |_, receiver, args| {
            let s = recv(receiver);
            let suffix = args.arg(0).as_str().map(|n| s.ends_with(&**n));
            Ok(Value::Bool(suffix.unwrap_or(false)))
        },
    },
    FnDesc {
        name: "format",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Any),
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let template = recv(receiver);
            let mut out = template.to_string();
            for (idx, value) in args.glob().iter().enumerate() {
                let hole = format!("@{idx}@");
                out = out.replace(&hole, &value.display(&wk.heap));
            }
            Ok(Value::Str(out.into()))
        },
    },
    FnDesc {
        name: "join",
        sig: Signature {
            required: &[param("pieces", TypeSpec::ArrayOf(&TypeSpec::Str))],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let sep = recv(receiver);
            let id = args.arg(0).as_obj().expect("bound as array");
            let pieces: Vec<&str> = wk
                .heap
                .array(id)
                .iter()
                .filter_map(|v| v.as_str().map(|s| &**s))
                .collect();
            Ok(Value::Str(pieces.join(&*sep).into()))
        },
    },
    FnDesc {
        name: "split",
        sig: Signature {
            required: &[],
            optional: &[param("separator", TypeSpec::Str)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let s = recv(receiver);
            let parts: Vec<Value> = match args.opt(0) {
                Some(sep) => {
                    let sep = sep.as_str().expect("bound as string");
                    s.split(&**sep).map(|p| Value::Str(p.into())).collect()
                }
                None => s
                    .split_whitespace()
                    .map(|p| Value::Str(p.into()))
                    .collect(),
            };
            Ok(wk.heap.alloc_array(parts))
        },
    },
    FnDesc {
        name: "startswith",
        sig: ARG1_STR,
        imp: |_, receiver, args| {
            let s = recv(receiver);
            let prefix = args.arg(0).as_str().map(|n| s.starts_with(&**n));
            Ok(Value::Bool(prefix.unwrap_or(false)))
        },
    },
    FnDesc {
        name: "strip",
        sig: Signature::NONE,
        imp: |_, receiver, _| Ok(Value::Str(recv(receiver).trim().into())),
    },
    FnDesc {
        name: "to_int",
        sig: Signature::NONE,
        imp: |_, receiver, args: Bound| {
            let s = recv(receiver);
            s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                LangError::new(
                    ErrorKind::Type {
                        expected: "integer-valued string".to_string(),
                        got: format!("'{s}'"),
                        param: "self".to_string(),
                    },
                    args.span,
                )
            })
        },
    },
    FnDesc {
        name: "to_lower",
        sig: Signature::NONE,
        imp: |_, receiver, _| Ok(Value::Str(recv(receiver).to_lowercase().into())),
    },
    FnDesc {
        name: "to_upper",
        sig: Signature::NONE,
        imp: |_, receiver, _| Ok(Value::Str(recv(receiver).to_uppercase().into())),
    },
    FnDesc {
        name: "underscorify",
        sig: Signature::NONE,
        imp: |_, receiver, _| {
            let s: String = recv(receiver)
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            Ok(Value::Str(s.into()))
        },
    },
    FnDesc {
        name: "version_compare",
        sig: Signature {
            required: &[param("constraint", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |_, receiver, args| {
            let version = recv(receiver);
            let constraint = args.arg(0).as_str().expect("bound as string");
            Ok(Value::Bool(version_compare(&version, constraint)))
        },
    },
];

/// Compares a dotted-numeric version against a constraint of the form
/// `>= 1.2`, `> 1`, `= 1.0`, `== 1.0`, `!= 2`, `< 3.1`, `<= 3`.
/// A bare version means equality. Missing segments compare as zero.
pub fn version_compare(version: &str, constraint: &str) -> bool {
    let constraint = constraint.trim();
    let (op, want) = if let Some(rest) = constraint.strip_prefix(">=") {
        (">=", rest)
    } else if let Some(rest) = constraint.strip_prefix("<=") {
        ("<=", rest)
    } else if let Some(rest) = constraint.strip_prefix("==") {
        ("==", rest)
    } else if let Some(rest) = constraint.strip_prefix("!=") {
        ("!=", rest)
    } else if let Some(rest) = constraint.strip_prefix('>') {
        (">", rest)
    } else if let Some(rest) = constraint.strip_prefix('<') {
        ("<", rest)
    } else if let Some(rest) = constraint.strip_prefix('=') {
        ("==", rest)
    } else {
        ("==", constraint)
    };

    let ordering = compare_versions(version.trim(), want.trim());
    match op {
        ">=" => ordering != Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        "<" => ordering == Ordering::Less,
        "!=" => ordering != Ordering::Equal,
        _ => ordering == Ordering::Equal,
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|seg| {
                seg.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for idx in 0..len {
        let (x, y) = (
            a.get(idx).copied().unwrap_or(0),
            b.get(idx).copied().unwrap_or(0),
        );
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_compare_covers_all_operators() {
        assert!(version_compare("1.2.3", ">= 1.2"));
        assert!(version_compare("1.2.3", "> 1.2"));
        assert!(version_compare("1.2", "= 1.2"));
        assert!(version_compare("1.2", "== 1.2.0"));
        assert!(version_compare("1.2", "!= 1.3"));
        assert!(version_compare("1.2", "< 2"));
        assert!(version_compare("1.2", "<= 1.2"));
        assert!(!version_compare("0.9", ">= 1.0"));
        // Bare constraint means equality.
        assert!(version_compare("2.0", "2.0"));
    }

    #[test]
    fn non_numeric_suffixes_compare_as_their_numeric_prefix() {
        assert!(version_compare("1.2rc1", ">= 1.2"));
    }
}
