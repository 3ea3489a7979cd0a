//! The abstract policy layer: what a script requires, stripped of how the
//! requirement is encoded.

use std::fmt;

use crate::Key;

/// An abstract spending condition tree. `Thresh(1, ..)` is disjunction,
/// `Thresh(n, [n items])` is conjunction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Semantic {
    /// Always satisfiable.
    Trivial,
    /// Never satisfiable.
    Unsatisfiable,
    Key(Key),
    After(u32),
    Older(u32),
    Sha256([u8; 32]),
    Hash256([u8; 32]),
    Ripemd160([u8; 20]),
    Hash160([u8; 20]),
    Thresh(usize, Vec<Semantic>),
}

impl Semantic {
    /// Canonical form: nested thresholds of the same flavour are
    /// flattened, trivial and unsatisfiable children are folded away, and
    /// degenerate thresholds collapse. Normalization is idempotent, so
    /// canonical forms compare by equality.
    pub fn normalized(&self) -> Semantic {
        match self {
            Semantic::Thresh(k, subs) => normalize_thresh(*k, subs),
            leaf => leaf.clone(),
        }
    }
}

fn normalize_thresh(k: usize, subs: &[Semantic]) -> Semantic {
    let is_and = k == subs.len() && subs.len() > 1;
    let is_or = k == 1 && subs.len() > 1;

    let mut children: Vec<Semantic> = Vec::with_capacity(subs.len());
    let mut k = k;
    for sub in subs {
        let sub = sub.normalized();
        match sub {
            // an always-true arm satisfies a disjunction outright and
            // disappears from a conjunction
            Semantic::Trivial if is_or => return Semantic::Trivial,
            Semantic::Trivial if is_and => {
                k -= 1;
            }
            // an unsatisfiable arm kills a conjunction and disappears
            // from a disjunction
            Semantic::Unsatisfiable if is_and => return Semantic::Unsatisfiable,
            Semantic::Unsatisfiable if is_or => {}
            // flatten same-flavour nesting
            Semantic::Thresh(sub_k, sub_children)
                if is_and && sub_k == sub_children.len() =>
            {
                k += sub_children.len() - 1;
                children.extend(sub_children);
            }
            Semantic::Thresh(1, sub_children) if is_or => {
                children.extend(sub_children);
            }
            other => children.push(other),
        }
    }

    if k == 0 {
        return Semantic::Trivial;
    }
    if children.len() < k {
        return Semantic::Unsatisfiable;
    }
    if children.len() == 1 && k == 1 {
        return children.remove(0);
    }
    Semantic::Thresh(k, children)
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Semantic::Trivial => write!(f, "TRIVIAL"),
            Semantic::Unsatisfiable => write!(f, "UNSATISFIABLE"),
            Semantic::Key(key) => write!(f, "pk({key})"),
            Semantic::After(n) => write!(f, "after({n})"),
            Semantic::Older(n) => write!(f, "older({n})"),
            Semantic::Sha256(h) => write!(f, "sha256({})", hex::encode(h)),
            Semantic::Hash256(h) => write!(f, "hash256({})", hex::encode(h)),
            Semantic::Ripemd160(h) => write!(f, "ripemd160({})", hex::encode(h)),
            Semantic::Hash160(h) => write!(f, "hash160({})", hex::encode(h)),
            Semantic::Thresh(k, subs) => {
                write!(f, "thresh({k}")?;
                for sub in subs {
                    write!(f, ",{sub}")?;
                }
                write!(f, ")")
            }
        }
    }
}
