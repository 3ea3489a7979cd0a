//! The typed miniscript AST: construction, typing, size analysis, script
//! synthesis and canonical display.

use std::fmt;
use std::str::FromStr;

use carina_tx::script::{opcodes, Script, ScriptElement};

use crate::extdata::{opt_add, opt_max, ExtData, TimelockInfo};
use crate::lex::TokenTree;
use crate::policy::Semantic;
use crate::types::{self, Base, Malleability, Type};
use crate::{Error, Key, MAX_TREE_HEIGHT};

/// Maximum value of a locktime argument.
const MAX_LOCKTIME: u32 = 0x7fff_ffff;

/// One miniscript constructor application. Children are owned, typed
/// sub-trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    True,
    False,
    PkK(Key),
    PkH(Key),
    After(u32),
    Older(u32),
    Sha256([u8; 32]),
    Hash256([u8; 32]),
    Ripemd160([u8; 20]),
    Hash160([u8; 20]),
    AndV(Box<Miniscript>, Box<Miniscript>),
    AndB(Box<Miniscript>, Box<Miniscript>),
    AndOr(Box<Miniscript>, Box<Miniscript>, Box<Miniscript>),
    OrB(Box<Miniscript>, Box<Miniscript>),
    OrC(Box<Miniscript>, Box<Miniscript>),
    OrD(Box<Miniscript>, Box<Miniscript>),
    OrI(Box<Miniscript>, Box<Miniscript>),
    Thresh(usize, Vec<Miniscript>),
    Multi(usize, Vec<Key>),
    MultiA(usize, Vec<Key>),
    Alt(Box<Miniscript>),
    Swap(Box<Miniscript>),
    Check(Box<Miniscript>),
    DupIf(Box<Miniscript>),
    Verify(Box<Miniscript>),
    NonZero(Box<Miniscript>),
    ZeroNotEqual(Box<Miniscript>),
}

/// A type-checked miniscript node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Miniscript {
    pub node: Fragment,
    pub ty: Type,
    pub mall: Malleability,
    pub ext: ExtData,
}

/// Witness bytes of a signature element for the given key flavour
/// (ECDSA respectively Schnorr, plus the length prefix).
fn sig_witness(key: &Key) -> usize {
    if key.is_x_only() {
        66
    } else {
        73
    }
}

/// Witness bytes of a key push element.
fn key_witness(key: &Key) -> usize {
    key.push_bytes().len() + 1
}

impl Miniscript {
    /// Type-check a constructor application and compute its analysis
    /// data. This is the only way to obtain a `Miniscript`, so every
    /// value in existence is well-typed.
    pub fn from_fragment(node: Fragment) -> Result<Self, Error> {
        let (ty, mall) = type_check(&node)?;
        let ext = ext_data(&node)?;
        if ext.height > MAX_TREE_HEIGHT {
            return Err(Error::RecursionLimit);
        }
        Ok(Miniscript {
            node,
            ty,
            mall,
            ext,
        })
    }

    /// The canonical script for this subtree.
    pub fn encode_script(&self) -> Script {
        let mut script = Script::new();
        encode_into(&self.node, &mut script);
        script
    }

    /// Surface the static analysis verdicts that make a script unusable.
    pub fn analyze(&self) -> Result<(), Error> {
        if self.ext.timelocks.contains_combination {
            return Err(Error::PolicyUnsatisfiable);
        }
        Ok(())
    }

    /// Abstract the spending conditions into the policy language.
    pub fn lift(&self) -> Semantic {
        match &self.node {
            Fragment::True => Semantic::Trivial,
            Fragment::False => Semantic::Unsatisfiable,
            Fragment::PkK(key) | Fragment::PkH(key) => Semantic::Key(*key),
            Fragment::After(n) => Semantic::After(*n),
            Fragment::Older(n) => Semantic::Older(*n),
            Fragment::Sha256(h) => Semantic::Sha256(*h),
            Fragment::Hash256(h) => Semantic::Hash256(*h),
            Fragment::Ripemd160(h) => Semantic::Ripemd160(*h),
            Fragment::Hash160(h) => Semantic::Hash160(*h),
            Fragment::AndV(x, y) | Fragment::AndB(x, y) => {
                Semantic::Thresh(2, vec![x.lift(), y.lift()])
            }
            Fragment::AndOr(x, y, z) => Semantic::Thresh(
                1,
                vec![
                    Semantic::Thresh(2, vec![x.lift(), y.lift()]),
                    z.lift(),
                ],
            ),
            Fragment::OrB(x, z)
            | Fragment::OrC(x, z)
            | Fragment::OrD(x, z)
            | Fragment::OrI(x, z) => Semantic::Thresh(1, vec![x.lift(), z.lift()]),
            Fragment::Thresh(k, subs) => {
                Semantic::Thresh(*k, subs.iter().map(Miniscript::lift).collect())
            }
            Fragment::Multi(k, keys) | Fragment::MultiA(k, keys) => Semantic::Thresh(
                *k,
                keys.iter().map(|key| Semantic::Key(*key)).collect(),
            ),
            Fragment::Alt(x)
            | Fragment::Swap(x)
            | Fragment::Check(x)
            | Fragment::DupIf(x)
            | Fragment::Verify(x)
            | Fragment::NonZero(x)
            | Fragment::ZeroNotEqual(x) => x.lift(),
        }
    }

    /// Build from a token tree.
    pub fn from_tree(tree: &TokenTree) -> Result<Self, Error> {
        let (wrappers, base) = match tree.name.split_once(':') {
            Some((wrappers, base)) => (wrappers, base),
            None => ("", tree.name.as_str()),
        };
        if base.is_empty() || wrappers.contains(':') {
            return Err(Error::UnknownFragment(tree.name.clone()));
        }

        let mut node = Self::base_from_tree(base, tree)?;
        for wrapper in wrappers.chars().rev() {
            let inner = Box::new(node);
            let fragment = match wrapper {
                'a' => Fragment::Alt(inner),
                's' => Fragment::Swap(inner),
                'c' => Fragment::Check(inner),
                'd' => Fragment::DupIf(inner),
                'v' => Fragment::Verify(inner),
                'j' => Fragment::NonZero(inner),
                'n' => Fragment::ZeroNotEqual(inner),
                't' => Fragment::AndV(inner, Box::new(Miniscript::from_fragment(Fragment::True)?)),
                'u' => Fragment::OrI(inner, Box::new(Miniscript::from_fragment(Fragment::False)?)),
                'l' => Fragment::OrI(Box::new(Miniscript::from_fragment(Fragment::False)?), inner),
                other => return Err(Error::UnknownFragment(format!("{other}:"))),
            };
            node = Miniscript::from_fragment(fragment)?;
        }
        Ok(node)
    }

    fn base_from_tree(base: &str, tree: &TokenTree) -> Result<Self, Error> {
        let children = &tree.children;
        let fragment = match (base, children.len()) {
            ("0", 0) => Fragment::False,
            ("1", 0) => Fragment::True,
            ("pk_k", 1) => Fragment::PkK(leaf_key(&children[0])?),
            ("pk_h", 1) => Fragment::PkH(leaf_key(&children[0])?),
            // pk(X) is sugar for c:pk_k(X); outer wrappers stack on top
            ("pk", 1) => Fragment::Check(Box::new(Miniscript::from_fragment(Fragment::PkK(
                leaf_key(&children[0])?,
            ))?)),
            ("pkh", 1) => Fragment::Check(Box::new(Miniscript::from_fragment(Fragment::PkH(
                leaf_key(&children[0])?,
            ))?)),
            ("after", 1) => Fragment::After(leaf_locktime(&children[0])?),
            ("older", 1) => Fragment::Older(leaf_locktime(&children[0])?),
            ("sha256", 1) => Fragment::Sha256(leaf_hash::<32>(&children[0])?),
            ("hash256", 1) => Fragment::Hash256(leaf_hash::<32>(&children[0])?),
            ("ripemd160", 1) => Fragment::Ripemd160(leaf_hash::<20>(&children[0])?),
            ("hash160", 1) => Fragment::Hash160(leaf_hash::<20>(&children[0])?),
            ("and_v", 2) => Fragment::AndV(sub(&children[0])?, sub(&children[1])?),
            ("and_b", 2) => Fragment::AndB(sub(&children[0])?, sub(&children[1])?),
            // and_n(X,Y) = andor(X,Y,0)
            ("and_n", 2) => Fragment::AndOr(
                sub(&children[0])?,
                sub(&children[1])?,
                Box::new(Miniscript::from_fragment(Fragment::False)?),
            ),
            ("andor", 3) => Fragment::AndOr(
                sub(&children[0])?,
                sub(&children[1])?,
                sub(&children[2])?,
            ),
            ("or_b", 2) => Fragment::OrB(sub(&children[0])?, sub(&children[1])?),
            ("or_c", 2) => Fragment::OrC(sub(&children[0])?, sub(&children[1])?),
            ("or_d", 2) => Fragment::OrD(sub(&children[0])?, sub(&children[1])?),
            ("or_i", 2) => Fragment::OrI(sub(&children[0])?, sub(&children[1])?),
            ("thresh", n) if n >= 2 => {
                let k = leaf_number(&children[0])?;
                let subs = children[1..]
                    .iter()
                    .map(|c| Miniscript::from_tree(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Fragment::Thresh(k, subs)
            }
            ("multi", n) if n >= 2 => {
                let k = leaf_number(&children[0])?;
                let keys = children[1..]
                    .iter()
                    .map(leaf_key)
                    .collect::<Result<Vec<_>, _>>()?;
                Fragment::Multi(k, keys)
            }
            ("multi_a", n) if n >= 2 => {
                let k = leaf_number(&children[0])?;
                let keys = children[1..]
                    .iter()
                    .map(leaf_key)
                    .collect::<Result<Vec<_>, _>>()?;
                Fragment::MultiA(k, keys)
            }
            _ => return Err(Error::UnknownFragment(base.to_string())),
        };
        Miniscript::from_fragment(fragment)
    }
}

fn sub(tree: &TokenTree) -> Result<Box<Miniscript>, Error> {
    Ok(Box::new(Miniscript::from_tree(tree)?))
}

fn leaf_key(tree: &TokenTree) -> Result<Key, Error> {
    if !tree.children.is_empty() {
        return Err(Error::InvalidKey(tree.name.clone()));
    }
    tree.name.parse()
}

fn leaf_number(tree: &TokenTree) -> Result<usize, Error> {
    if !tree.children.is_empty() {
        return Err(Error::InvalidNumber(tree.name.clone()));
    }
    tree.name
        .parse()
        .map_err(|_| Error::InvalidNumber(tree.name.clone()))
}

fn leaf_locktime(tree: &TokenTree) -> Result<u32, Error> {
    let value = leaf_number(tree)?;
    if value == 0 || value > MAX_LOCKTIME as usize {
        return Err(Error::InvalidNumber(tree.name.clone()));
    }
    Ok(value as u32)
}

fn leaf_hash<const N: usize>(tree: &TokenTree) -> Result<[u8; N], Error> {
    if !tree.children.is_empty() {
        return Err(Error::InvalidHash(tree.name.clone()));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(&tree.name, &mut out).map_err(|_| Error::InvalidHash(tree.name.clone()))?;
    Ok(out)
}

impl FromStr for Miniscript {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Miniscript::from_tree(&TokenTree::parse(s)?)
    }
}

// -- typing ------------------------------------------------------------

fn tm(ms: &Miniscript) -> (Type, Malleability) {
    (ms.ty, ms.mall)
}

fn type_check(node: &Fragment) -> Result<(Type, Malleability), Error> {
    match node {
        Fragment::True => Ok(types::true_type()),
        Fragment::False => Ok(types::false_type()),
        Fragment::PkK(_) => Ok(types::pk_k_type()),
        Fragment::PkH(_) => Ok(types::pk_h_type()),
        Fragment::After(_) | Fragment::Older(_) => Ok(types::time_type()),
        Fragment::Sha256(_)
        | Fragment::Hash256(_)
        | Fragment::Ripemd160(_)
        | Fragment::Hash160(_) => Ok(types::hash_type()),
        Fragment::AndV(x, y) => types::and_v(tm(x), tm(y)),
        Fragment::AndB(x, y) => types::and_b(tm(x), tm(y)),
        Fragment::AndOr(x, y, z) => types::and_or(tm(x), tm(y), tm(z)),
        Fragment::OrB(x, z) => types::or_b(tm(x), tm(z)),
        Fragment::OrC(x, z) => types::or_c(tm(x), tm(z)),
        Fragment::OrD(x, z) => types::or_d(tm(x), tm(z)),
        Fragment::OrI(x, z) => types::or_i(tm(x), tm(z)),
        Fragment::Thresh(k, subs) => {
            let children: Vec<(Type, Malleability)> = subs.iter().map(tm).collect();
            types::thresh(*k, &children)
        }
        Fragment::Multi(k, keys) => {
            check_key_count(*k, keys.len(), 20)?;
            if keys.iter().any(Key::is_x_only) {
                return Err(Error::TypeCheck {
                    fragment: "multi",
                    reason: "CHECKMULTISIG requires full keys".to_string(),
                });
            }
            Ok(types::multi_type())
        }
        Fragment::MultiA(k, keys) => {
            check_key_count(*k, keys.len(), 999)?;
            Ok(types::multi_a_type())
        }
        Fragment::Alt(x) => types::alt(tm(x)),
        Fragment::Swap(x) => types::swap(tm(x)),
        Fragment::Check(x) => types::check(tm(x)),
        Fragment::DupIf(x) => types::dup_if(tm(x)),
        Fragment::Verify(x) => types::verify(tm(x)),
        Fragment::NonZero(x) => types::non_zero(tm(x)),
        Fragment::ZeroNotEqual(x) => types::zero_not_equal(tm(x)),
    }
}

fn check_key_count(k: usize, n: usize, max: usize) -> Result<(), Error> {
    if k == 0 || k > n || n > max {
        return Err(Error::InvalidThreshold { k, n });
    }
    Ok(())
}

// -- extra data --------------------------------------------------------

fn ext_data(node: &Fragment) -> Result<ExtData, Error> {
    // script size and op count come straight from the synthesized script
    let mut script = Script::new();
    encode_into(node, &mut script);
    let pk_cost = script.to_bytes().len();
    let static_ops = script
        .elements()
        .iter()
        .filter(|e| matches!(e, ScriptElement::Opcode(_)))
        .count();

    let (sat_size, dissat_size, timelocks, height) = match node {
        Fragment::True => (Some(0), None, TimelockInfo::default(), 1),
        Fragment::False => (None, Some(0), TimelockInfo::default(), 1),
        Fragment::PkK(key) => (
            Some(sig_witness(key)),
            Some(1),
            TimelockInfo::default(),
            1,
        ),
        Fragment::PkH(key) => (
            Some(sig_witness(key) + key_witness(key)),
            Some(1 + key_witness(key)),
            TimelockInfo::default(),
            1,
        ),
        Fragment::After(n) => (Some(0), None, TimelockInfo::from_after(*n), 1),
        Fragment::Older(n) => (Some(0), None, TimelockInfo::from_older(*n), 1),
        Fragment::Sha256(_)
        | Fragment::Hash256(_)
        | Fragment::Ripemd160(_)
        | Fragment::Hash160(_) => (Some(33), Some(33), TimelockInfo::default(), 1),
        Fragment::Multi(k, _) => (
            Some(1 + 73 * k),
            Some(1 + k),
            TimelockInfo::default(),
            1,
        ),
        Fragment::MultiA(k, keys) => (
            Some(66 * k + (keys.len() - k)),
            Some(keys.len()),
            TimelockInfo::default(),
            1,
        ),
        Fragment::AndV(x, y) => (
            opt_add(x.ext.sat_size, y.ext.sat_size),
            opt_add(x.ext.sat_size, y.ext.dissat_size),
            x.ext.timelocks.combine_and(y.ext.timelocks),
            1 + x.ext.height.max(y.ext.height),
        ),
        Fragment::AndB(x, y) => (
            opt_add(x.ext.sat_size, y.ext.sat_size),
            opt_add(x.ext.dissat_size, y.ext.dissat_size),
            x.ext.timelocks.combine_and(y.ext.timelocks),
            1 + x.ext.height.max(y.ext.height),
        ),
        Fragment::AndOr(x, y, z) => (
            opt_max(
                opt_add(x.ext.sat_size, y.ext.sat_size),
                opt_add(x.ext.dissat_size, z.ext.sat_size),
            ),
            opt_add(x.ext.dissat_size, z.ext.dissat_size),
            x.ext
                .timelocks
                .combine_and(y.ext.timelocks)
                .combine_or(z.ext.timelocks),
            1 + x.ext.height.max(y.ext.height).max(z.ext.height),
        ),
        Fragment::OrB(x, z) => (
            opt_max(
                opt_add(x.ext.sat_size, z.ext.dissat_size),
                opt_add(x.ext.dissat_size, z.ext.sat_size),
            ),
            opt_add(x.ext.dissat_size, z.ext.dissat_size),
            x.ext.timelocks.combine_or(z.ext.timelocks),
            1 + x.ext.height.max(z.ext.height),
        ),
        Fragment::OrC(x, z) => (
            opt_max(x.ext.sat_size, opt_add(x.ext.dissat_size, z.ext.sat_size)),
            None,
            x.ext.timelocks.combine_or(z.ext.timelocks),
            1 + x.ext.height.max(z.ext.height),
        ),
        Fragment::OrD(x, z) => (
            opt_max(x.ext.sat_size, opt_add(x.ext.dissat_size, z.ext.sat_size)),
            opt_add(x.ext.dissat_size, z.ext.dissat_size),
            x.ext.timelocks.combine_or(z.ext.timelocks),
            1 + x.ext.height.max(z.ext.height),
        ),
        Fragment::OrI(x, z) => (
            opt_max(
                x.ext.sat_size.map(|s| s + 2),
                z.ext.sat_size.map(|s| s + 1),
            ),
            opt_max(
                x.ext.dissat_size.map(|s| s + 2),
                z.ext.dissat_size.map(|s| s + 1),
            ),
            x.ext.timelocks.combine_or(z.ext.timelocks),
            1 + x.ext.height.max(z.ext.height),
        ),
        Fragment::Thresh(k, subs) => {
            let mut sat = Some(0);
            let mut dissat = Some(0);
            for sub in subs {
                sat = opt_add(sat, opt_max(sub.ext.sat_size, sub.ext.dissat_size));
                dissat = opt_add(dissat, sub.ext.dissat_size);
            }
            (
                sat,
                dissat,
                TimelockInfo::combine_thresh(*k, subs.iter().map(|s| s.ext.timelocks)),
                1 + subs.iter().map(|s| s.ext.height).max().unwrap_or(0),
            )
        }
        Fragment::Alt(x) | Fragment::Swap(x) | Fragment::Check(x) | Fragment::ZeroNotEqual(x) => (
            x.ext.sat_size,
            x.ext.dissat_size,
            x.ext.timelocks,
            1 + x.ext.height,
        ),
        Fragment::DupIf(x) => (
            x.ext.sat_size.map(|s| s + 2),
            Some(1),
            x.ext.timelocks,
            1 + x.ext.height,
        ),
        Fragment::Verify(x) => (x.ext.sat_size, None, x.ext.timelocks, 1 + x.ext.height),
        Fragment::NonZero(x) => (x.ext.sat_size, Some(1), x.ext.timelocks, 1 + x.ext.height),
    };

    Ok(ExtData {
        pk_cost,
        static_ops,
        sat_size,
        dissat_size,
        timelocks,
        height,
    })
}

// -- script synthesis --------------------------------------------------

fn encode_into(node: &Fragment, script: &mut Script) {
    use opcodes::*;
    match node {
        Fragment::True => {
            script.push_opcode(OP_1);
        }
        Fragment::False => {
            script.push_opcode(OP_0);
        }
        Fragment::PkK(key) => {
            script.push_slice(&key.push_bytes());
        }
        Fragment::PkH(key) => {
            script
                .push_opcode(OP_DUP)
                .push_opcode(OP_HASH160)
                .push_slice(&key.hash160())
                .push_opcode(OP_EQUALVERIFY);
        }
        Fragment::After(n) => {
            script
                .push_int(*n as i64)
                .push_opcode(OP_CHECKLOCKTIMEVERIFY);
        }
        Fragment::Older(n) => {
            script
                .push_int(*n as i64)
                .push_opcode(OP_CHECKSEQUENCEVERIFY);
        }
        Fragment::Sha256(h) => encode_hashlock(script, OP_SHA256, h),
        Fragment::Hash256(h) => encode_hashlock(script, OP_HASH256, h),
        Fragment::Ripemd160(h) => encode_hashlock(script, OP_RIPEMD160, h),
        Fragment::Hash160(h) => encode_hashlock(script, OP_HASH160, h),
        Fragment::AndV(x, y) => {
            encode_into(&x.node, script);
            encode_into(&y.node, script);
        }
        Fragment::AndB(x, y) => {
            encode_into(&x.node, script);
            encode_into(&y.node, script);
            script.push_opcode(OP_BOOLAND);
        }
        Fragment::AndOr(x, y, z) => {
            encode_into(&x.node, script);
            script.push_opcode(OP_NOTIF);
            encode_into(&z.node, script);
            script.push_opcode(OP_ELSE);
            encode_into(&y.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::OrB(x, z) => {
            encode_into(&x.node, script);
            encode_into(&z.node, script);
            script.push_opcode(OP_BOOLOR);
        }
        Fragment::OrC(x, z) => {
            encode_into(&x.node, script);
            script.push_opcode(OP_NOTIF);
            encode_into(&z.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::OrD(x, z) => {
            encode_into(&x.node, script);
            script.push_opcode(OP_IFDUP);
            script.push_opcode(OP_NOTIF);
            encode_into(&z.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::OrI(x, z) => {
            script.push_opcode(OP_IF);
            encode_into(&x.node, script);
            script.push_opcode(OP_ELSE);
            encode_into(&z.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::Thresh(k, subs) => {
            for (i, sub) in subs.iter().enumerate() {
                encode_into(&sub.node, script);
                if i > 0 {
                    script.push_opcode(OP_ADD);
                }
            }
            script.push_int(*k as i64).push_opcode(OP_EQUAL);
        }
        Fragment::Multi(k, keys) => {
            script.push_int(*k as i64);
            for key in keys {
                script.push_slice(&key.push_bytes());
            }
            script
                .push_int(keys.len() as i64)
                .push_opcode(OP_CHECKMULTISIG);
        }
        Fragment::MultiA(k, keys) => {
            for (i, key) in keys.iter().enumerate() {
                script.push_slice(&key.push_bytes());
                script.push_opcode(if i == 0 { OP_CHECKSIG } else { OP_CHECKSIGADD });
            }
            script.push_int(*k as i64).push_opcode(OP_NUMEQUAL);
        }
        Fragment::Alt(x) => {
            script.push_opcode(OP_TOALTSTACK);
            encode_into(&x.node, script);
            script.push_opcode(OP_FROMALTSTACK);
        }
        Fragment::Swap(x) => {
            script.push_opcode(OP_SWAP);
            encode_into(&x.node, script);
        }
        Fragment::Check(x) => {
            encode_into(&x.node, script);
            script.push_opcode(OP_CHECKSIG);
        }
        Fragment::DupIf(x) => {
            script.push_opcode(OP_DUP);
            script.push_opcode(OP_IF);
            encode_into(&x.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::Verify(x) => {
            encode_into(&x.node, script);
            // fold into the verify form of the previous opcode when one
            // exists
            let folded = match script.last_opcode() {
                Some(OP_EQUAL) => script.replace_last_opcode(OP_EQUALVERIFY),
                Some(OP_NUMEQUAL) => script.replace_last_opcode(OP_NUMEQUALVERIFY),
                Some(OP_CHECKSIG) => script.replace_last_opcode(OP_CHECKSIGVERIFY),
                Some(OP_CHECKMULTISIG) => script.replace_last_opcode(OP_CHECKMULTISIGVERIFY),
                _ => false,
            };
            if !folded {
                script.push_opcode(OP_VERIFY);
            }
        }
        Fragment::NonZero(x) => {
            script.push_opcode(OP_SIZE);
            script.push_opcode(OP_0NOTEQUAL);
            script.push_opcode(OP_IF);
            encode_into(&x.node, script);
            script.push_opcode(OP_ENDIF);
        }
        Fragment::ZeroNotEqual(x) => {
            encode_into(&x.node, script);
            script.push_opcode(OP_0NOTEQUAL);
        }
    }
}

fn encode_hashlock(script: &mut Script, hash_op: u8, digest: &[u8]) {
    script
        .push_opcode(opcodes::OP_SIZE)
        .push_int(32)
        .push_opcode(opcodes::OP_EQUALVERIFY)
        .push_opcode(hash_op)
        .push_slice(digest)
        .push_opcode(opcodes::OP_EQUAL);
}

// -- display -----------------------------------------------------------

impl fmt::Display for Miniscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // collect consecutive wrappers into a single prefix, printing the
        // t/u/l sugar back for its three desugarings
        let mut wrappers = String::new();
        let mut node = &self.node;
        loop {
            let (c, next) = match node {
                Fragment::Alt(x) => ('a', x),
                Fragment::Swap(x) => ('s', x),
                Fragment::Check(x) => ('c', x),
                Fragment::DupIf(x) => ('d', x),
                Fragment::Verify(x) => ('v', x),
                Fragment::NonZero(x) => ('j', x),
                Fragment::ZeroNotEqual(x) => ('n', x),
                Fragment::AndV(x, y) if matches!(y.node, Fragment::True) => ('t', x),
                Fragment::OrI(x, z) if matches!(z.node, Fragment::False) => ('u', x),
                Fragment::OrI(x, z) if matches!(x.node, Fragment::False) => ('l', z),
                _ => break,
            };
            wrappers.push(c);
            node = &next.node;
        }
        if !wrappers.is_empty() {
            write!(f, "{wrappers}:")?;
        }
        match node {
            Fragment::True => write!(f, "1"),
            Fragment::False => write!(f, "0"),
            Fragment::PkK(key) => write!(f, "pk_k({key})"),
            Fragment::PkH(key) => write!(f, "pk_h({key})"),
            Fragment::After(n) => write!(f, "after({n})"),
            Fragment::Older(n) => write!(f, "older({n})"),
            Fragment::Sha256(h) => write!(f, "sha256({})", hex::encode(h)),
            Fragment::Hash256(h) => write!(f, "hash256({})", hex::encode(h)),
            Fragment::Ripemd160(h) => write!(f, "ripemd160({})", hex::encode(h)),
            Fragment::Hash160(h) => write!(f, "hash160({})", hex::encode(h)),
            Fragment::AndV(x, y) => write!(f, "and_v({x},{y})"),
            Fragment::AndB(x, y) => write!(f, "and_b({x},{y})"),
            Fragment::AndOr(x, y, z) => write!(f, "andor({x},{y},{z})"),
            Fragment::OrB(x, z) => write!(f, "or_b({x},{z})"),
            Fragment::OrC(x, z) => write!(f, "or_c({x},{z})"),
            Fragment::OrD(x, z) => write!(f, "or_d({x},{z})"),
            Fragment::OrI(x, z) => write!(f, "or_i({x},{z})"),
            Fragment::Thresh(k, subs) => {
                write!(f, "thresh({k}")?;
                for sub in subs {
                    write!(f, ",{sub}")?;
                }
                write!(f, ")")
            }
            Fragment::Multi(k, keys) => {
                write!(f, "multi({k}")?;
                for key in keys {
                    write!(f, ",{key}")?;
                }
                write!(f, ")")
            }
            Fragment::MultiA(k, keys) => {
                write!(f, "multi_a({k}")?;
                for key in keys {
                    write!(f, ",{key}")?;
                }
                write!(f, ")")
            }
            // wrappers were consumed above
            _ => unreachable!("wrapper fragments handled in the prefix loop"),
        }
    }
}
