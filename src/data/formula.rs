//! Factorial model formulas over categorical factors.

use crate::error::{CellCountError, Result};
use serde::{Deserialize, Serialize};

/// A term in a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Main effect of a factor.
    Main(String),
    /// Interaction between two factors.
    Interaction(String, String),
}

impl Term {
    /// Factor names involved in this term.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Term::Main(v) => vec![v.as_str()],
            Term::Interaction(v1, v2) => vec![v1.as_str(), v2.as_str()],
        }
    }

    /// Number of factors in the term.
    pub fn order(&self) -> usize {
        self.variables().len()
    }

    /// Whether this term contains `other`, i.e. involves every factor of it.
    ///
    /// A term contains itself.
    pub fn contains(&self, other: &Term) -> bool {
        let own = self.variables();
        other.variables().iter().all(|v| own.contains(v))
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Main(v) => write!(f, "{}", v),
            Term::Interaction(v1, v2) => write!(f, "{}:{}", v1, v2),
        }
    }
}

/// A parsed right-hand side of a linear model with an intercept.
///
/// Supported syntax:
/// - `~ a` - main effect
/// - `~ a + b` - two main effects
/// - `~ a * b` - a + b + a:b
/// - `~ a + b + a:b` - same as above, spelled out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Terms in the formula (the intercept is implicit).
    pub terms: Vec<Term>,
    /// Original formula string.
    pub formula_str: String,
}

impl Formula {
    /// Parse a formula string.
    ///
    /// # Examples
    /// ```
    /// use cellcount_analysis::data::Formula;
    /// let f = Formula::parse("~ response * time_from_treatment_start").unwrap();
    /// assert_eq!(f.terms.len(), 3);
    /// ```
    pub fn parse(formula: &str) -> Result<Self> {
        let formula_str = formula.to_string();
        let formula = formula.trim();

        let rhs = formula.strip_prefix('~').ok_or_else(|| {
            CellCountError::FormulaParse("Formula must start with '~'".to_string())
        })?;
        let rhs = rhs.trim();
        if rhs.is_empty() {
            return Err(CellCountError::FormulaParse(
                "Formula right-hand side is empty".to_string(),
            ));
        }

        let mut terms: Vec<Term> = Vec::new();
        let mut push = |term: Term| {
            if !terms.contains(&term) {
                terms.push(term);
            }
        };

        for term_str in rhs.split('+').map(str::trim) {
            if term_str.is_empty() {
                return Err(CellCountError::FormulaParse(format!(
                    "Empty term in '{}'",
                    formula_str
                )));
            }
            if term_str == "0" || term_str == "-1" || term_str.starts_with('-') {
                return Err(CellCountError::FormulaParse(
                    "Removing the intercept is not supported".to_string(),
                ));
            }
            if term_str == "1" {
                continue;
            }

            if let Some((v1, v2)) = split_pair(term_str, '*')? {
                push(Term::Main(v1.clone()));
                push(Term::Main(v2.clone()));
                push(Term::Interaction(v1, v2));
            } else if let Some((v1, v2)) = split_pair(term_str, ':')? {
                push(Term::Interaction(v1, v2));
            } else {
                check_name(term_str)?;
                push(Term::Main(term_str.to_string()));
            }
        }

        if terms.is_empty() {
            return Err(CellCountError::FormulaParse(
                "Formula must have at least one term".to_string(),
            ));
        }

        Ok(Self { terms, formula_str })
    }

    /// Full two-factor design: both main effects and their interaction.
    pub fn factorial(a: &str, b: &str) -> Self {
        Self {
            terms: vec![
                Term::Main(a.to_string()),
                Term::Main(b.to_string()),
                Term::Interaction(a.to_string(), b.to_string()),
            ],
            formula_str: format!("~ {} * {}", a, b),
        }
    }

    /// All factor names used in the formula, sorted and deduplicated.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.terms.iter().flat_map(|t| t.variables()).collect();
        vars.sort();
        vars.dedup();
        vars
    }

    /// Check if a factor is used in the formula.
    pub fn uses_variable(&self, name: &str) -> bool {
        self.terms.iter().any(|t| t.variables().contains(&name))
    }

    /// Terms that do not contain `term`.
    ///
    /// This is the comparison model when `term` is tested with every effect
    /// of equal or lower order already present (Type II).
    pub fn terms_marginal_to(&self, term: &Term) -> Vec<Term> {
        self.terms
            .iter()
            .filter(|t| !t.contains(term))
            .cloned()
            .collect()
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let term_strs: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "~ {}", term_strs.join(" + "))
    }
}

fn split_pair(term_str: &str, sep: char) -> Result<Option<(String, String)>> {
    if !term_str.contains(sep) {
        return Ok(None);
    }
    let parts: Vec<&str> = term_str.split(sep).map(str::trim).collect();
    if parts.len() != 2 {
        return Err(CellCountError::FormulaParse(format!(
            "Only two-way interactions are supported: {}",
            term_str
        )));
    }
    check_name(parts[0])?;
    check_name(parts[1])?;
    if parts[0] == parts[1] {
        return Err(CellCountError::FormulaParse(format!(
            "Factor interacts with itself: {}",
            term_str
        )));
    }
    Ok(Some((parts[0].to_string(), parts[1].to_string())))
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || "()~*:+-".contains(c)) {
        return Err(CellCountError::FormulaParse(format!(
            "Invalid factor name '{}'",
            name
        )));
    }
    Ok(())
}
