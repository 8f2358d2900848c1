//! Argument synthesis from parameter names.
//!
//! An ordered table of (predicate, generator) rules is evaluated top to
//! bottom and the first match wins. The last rule matches everything, so
//! every parameter receives exactly one literal and synthesis cannot fail.
//! The table order is load-bearing for deterministic output.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::values::ValueType;

/// Inclusive range for `a`/`b` integers.
pub const ARITHMETIC_RANGE: RangeInclusive<i64> = 1..=10;

// ============================================================================
// Binding
// ============================================================================

/// One synthesized argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Parameter name.
    pub name: String,
    /// Python literal text, embedded verbatim in generated calls.
    pub literal: String,
    pub value_type: ValueType,
}

/// Synthesized arguments for one function, in parameter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentBinding {
    args: Vec<Argument>,
}

impl ArgumentBinding {
    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Literal texts in order.
    pub fn literals(&self) -> Vec<String> {
        self.args.iter().map(|a| a.literal.clone()).collect()
    }

    /// Literals joined as a call argument list: `1, "x"`.
    pub fn call_args(&self) -> String {
        self.literals().join(", ")
    }
}

// ============================================================================
// Integer Source
// ============================================================================

/// Where `a`/`b` integers come from.
#[derive(Debug)]
pub enum IntSource {
    /// Uniform draws from a random generator.
    Random(Box<StdRng>),
    /// Always the same value.
    Fixed(i64),
}

impl IntSource {
    /// Random source seeded from the OS.
    pub fn from_entropy() -> Self {
        IntSource::Random(Box::new(StdRng::from_os_rng()))
    }

    /// Random source with a reproducible seed.
    pub fn seeded(seed: u64) -> Self {
        IntSource::Random(Box::new(StdRng::seed_from_u64(seed)))
    }

    fn next_in(&mut self, range: RangeInclusive<i64>) -> i64 {
        match self {
            IntSource::Random(rng) => rng.random_range(range),
            IntSource::Fixed(value) => *value,
        }
    }
}

// ============================================================================
// Rule Table
// ============================================================================

type Predicate = fn(&str) -> bool;
type Generator = fn(&str, &mut IntSource) -> (String, ValueType);

/// One row of the synthesis table.
pub struct SynthRule {
    /// Short label for diagnostics.
    pub label: &'static str,
    matches: Predicate,
    generate: Generator,
}

/// The synthesis table, in evaluation order.
pub const RULES: &[SynthRule] = &[
    SynthRule {
        label: "arithmetic",
        matches: is_arithmetic,
        generate: random_int,
    },
    SynthRule {
        label: "identifier",
        matches: is_identifier_like,
        generate: example_string,
    },
    SynthRule {
        label: "file",
        matches: is_file_like,
        generate: dummy_file,
    },
    SynthRule {
        label: "exception",
        matches: is_exception,
        generate: exception_label,
    },
    SynthRule {
        label: "default",
        matches: always,
        generate: default_string,
    },
];

fn is_arithmetic(name: &str) -> bool {
    name == "a" || name == "b"
}

fn is_identifier_like(name: &str) -> bool {
    matches!(name.to_lowercase().as_str(), "name" | "title" | "key")
}

fn is_file_like(name: &str) -> bool {
    matches!(name.to_lowercase().as_str(), "file_path" | "file")
}

fn is_exception(name: &str) -> bool {
    name.to_lowercase() == "exception"
}

fn always(_: &str) -> bool {
    true
}

fn random_int(_: &str, ints: &mut IntSource) -> (String, ValueType) {
    (ints.next_in(ARITHMETIC_RANGE).to_string(), ValueType::Integer)
}

fn example_string(name: &str, _: &mut IntSource) -> (String, ValueType) {
    (format!("\"{}_example\"", name), ValueType::String)
}

fn dummy_file(_: &str, _: &mut IntSource) -> (String, ValueType) {
    ("\"dummy_file.txt\"".to_string(), ValueType::String)
}

fn exception_label(_: &str, _: &mut IntSource) -> (String, ValueType) {
    ("\"ValueError\"".to_string(), ValueType::String)
}

fn default_string(_: &str, _: &mut IntSource) -> (String, ValueType) {
    ("\"default_value\"".to_string(), ValueType::String)
}

// ============================================================================
// Synthesizer
// ============================================================================

/// Proposes one literal per parameter name.
#[derive(Debug)]
pub struct ArgumentSynthesizer {
    ints: IntSource,
}

impl ArgumentSynthesizer {
    pub fn new(ints: IntSource) -> Self {
        ArgumentSynthesizer { ints }
    }

    /// Bind every parameter to a literal.
    pub fn synthesize(&mut self, params: &[String]) -> ArgumentBinding {
        let args = params
            .iter()
            .map(|name| {
                let rule = rule_for(name);
                let (literal, value_type) = (rule.generate)(name, &mut self.ints);
                Argument {
                    name: name.clone(),
                    literal,
                    value_type,
                }
            })
            .collect();
        ArgumentBinding { args }
    }
}

/// First rule whose predicate matches `name`.
pub fn rule_for(name: &str) -> &'static SynthRule {
    RULES
        .iter()
        .find(|rule| (rule.matches)(name))
        .unwrap_or(&RULES[RULES.len() - 1])
}

// ============================================================================
// Tests
// ============================================================================
