//! Output descriptors: a checksum-protected textual form of scriptPubKey
//! generators.

use std::fmt;

use carina_addresses::{Address, NetworkParams};
use carina_crypto::hash::sha256;
use carina_crypto::taproot;
use carina_tx::script::{opcodes, Script};

use crate::ast::Miniscript;
use crate::lex::TokenTree;
use crate::taptree::TapTree;
use crate::{Error, Key};

/// Everything the `sh()` wrapper may contain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShInner {
    Wpkh(Key),
    Wsh(Miniscript),
    SortedMulti(usize, Vec<Key>),
    Ms(Miniscript),
}

/// A Taproot script tree whose leaves are miniscripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapScriptTree {
    Leaf(Miniscript),
    Branch(Box<TapScriptTree>, Box<TapScriptTree>),
}

impl TapScriptTree {
    /// Lower to the hash-level tree of leaf scripts.
    pub fn to_tap_tree(&self) -> TapTree {
        match self {
            TapScriptTree::Leaf(ms) => TapTree::Leaf(ms.encode_script().to_bytes()),
            TapScriptTree::Branch(l, r) => {
                TapTree::Branch(Box::new(l.to_tap_tree()), Box::new(r.to_tap_tree()))
            }
        }
    }
}

/// A parsed output descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    Pk(Key),
    Pkh(Key),
    Wpkh(Key),
    Sh(ShInner),
    Wsh(Miniscript),
    Tr(Key, Option<TapScriptTree>),
    Multi {
        sorted: bool,
        k: usize,
        keys: Vec<Key>,
    },
    Addr(Address),
    Raw(Vec<u8>),
}

impl Descriptor {
    /// Parse a descriptor string, verifying the `#checksum` suffix when
    /// present. Network parameters are needed to decode `addr()` bodies.
    pub fn parse(s: &str, params: &NetworkParams) -> Result<Self, Error> {
        let body = match s.split_once('#') {
            Some((body, found)) => {
                let expected = checksum(body)?;
                if found != expected {
                    return Err(Error::BadChecksum {
                        expected,
                        found: found.to_string(),
                    });
                }
                body
            }
            None => s,
        };

        let tree = TokenTree::parse(body)?;
        Self::from_tree(&tree, params)
    }

    fn from_tree(tree: &TokenTree, params: &NetworkParams) -> Result<Self, Error> {
        let children = &tree.children;
        Ok(match (tree.name.as_str(), children.len()) {
            ("pk", 1) => Descriptor::Pk(leaf_key(&children[0])?),
            ("pkh", 1) => Descriptor::Pkh(leaf_key(&children[0])?),
            ("wpkh", 1) => Descriptor::Wpkh(leaf_key(&children[0])?),
            ("sh", 1) => Descriptor::Sh(Self::sh_inner(&children[0])?),
            ("wsh", 1) => Descriptor::Wsh(Miniscript::from_tree(&children[0])?),
            ("tr", 1) => Descriptor::Tr(leaf_key(&children[0])?, None),
            ("tr", 2) => Descriptor::Tr(
                leaf_key(&children[0])?,
                Some(Self::tap_tree(&children[1])?),
            ),
            ("multi", n) if n >= 2 => {
                let (k, keys) = multi_args(children)?;
                Descriptor::Multi {
                    sorted: false,
                    k,
                    keys,
                }
            }
            ("sortedmulti", n) if n >= 2 => {
                let (k, keys) = multi_args(children)?;
                Descriptor::Multi {
                    sorted: true,
                    k,
                    keys,
                }
            }
            ("addr", 1) if children[0].children.is_empty() => {
                Descriptor::Addr(Address::decode(&children[0].name, params)?)
            }
            ("raw", 1) if children[0].children.is_empty() => Descriptor::Raw(
                hex::decode(&children[0].name)
                    .map_err(|_| Error::BadDescriptor(children[0].name.clone()))?,
            ),
            _ => return Err(Error::BadDescriptor(tree.name.clone())),
        })
    }

    fn sh_inner(tree: &TokenTree) -> Result<ShInner, Error> {
        Ok(match (tree.name.as_str(), tree.children.len()) {
            ("wpkh", 1) => ShInner::Wpkh(leaf_key(&tree.children[0])?),
            ("wsh", 1) => ShInner::Wsh(Miniscript::from_tree(&tree.children[0])?),
            ("sortedmulti", n) if n >= 2 => {
                let (k, keys) = multi_args(&tree.children)?;
                ShInner::SortedMulti(k, keys)
            }
            _ => ShInner::Ms(Miniscript::from_tree(tree)?),
        })
    }

    fn tap_tree(tree: &TokenTree) -> Result<TapScriptTree, Error> {
        if tree.name == "{}" {
            return Ok(TapScriptTree::Branch(
                Box::new(Self::tap_tree(&tree.children[0])?),
                Box::new(Self::tap_tree(&tree.children[1])?),
            ));
        }
        Ok(TapScriptTree::Leaf(Miniscript::from_tree(tree)?))
    }

    /// Synthesize the scriptPubKey this descriptor generates.
    pub fn script_pubkey(&self, params: &NetworkParams) -> Result<Vec<u8>, Error> {
        Ok(match self {
            Descriptor::Pk(key) => {
                let mut script = Script::new();
                script
                    .push_slice(&key.push_bytes())
                    .push_opcode(opcodes::OP_CHECKSIG);
                script.to_bytes()
            }
            Descriptor::Pkh(key) => p2pkh_script(&key.hash160()),
            Descriptor::Wpkh(key) => witness_program(0, &key.hash160()),
            Descriptor::Sh(inner) => {
                let inner_script = inner.script()?;
                let mut out = Vec::with_capacity(23);
                out.push(opcodes::OP_HASH160);
                out.push(0x14);
                out.extend_from_slice(
                    carina_crypto::hash::hash160(&inner_script).as_ref(),
                );
                out.push(opcodes::OP_EQUAL);
                out
            }
            Descriptor::Wsh(ms) => {
                witness_program(0, sha256(&ms.encode_script().to_bytes()).as_ref())
            }
            Descriptor::Tr(key, tree) => {
                let root = tree.as_ref().map(|t| t.to_tap_tree().root_hash());
                let tweaked = taproot::tap_tweak(&key.x_only_bytes(), root.as_ref())?;
                witness_program(1, &tweaked.output.x_only()?)
            }
            Descriptor::Multi { sorted, k, keys } => {
                multisig_script(*k, keys, *sorted)?.to_bytes()
            }
            Descriptor::Addr(address) => address
                .script_pubkey(params)
                .ok_or_else(|| Error::BadDescriptor("addr() is not script-addressed".into()))?,
            Descriptor::Raw(bytes) => bytes.clone(),
        })
    }

    /// The descriptor body plus its checksum, ready for storage.
    pub fn to_string_with_checksum(&self) -> Result<String, Error> {
        let body = self.to_string();
        let checksum = checksum(&body)?;
        Ok(format!("{body}#{checksum}"))
    }
}

impl ShInner {
    fn script(&self) -> Result<Vec<u8>, Error> {
        Ok(match self {
            ShInner::Wpkh(key) => witness_program(0, &key.hash160()),
            ShInner::Wsh(ms) => {
                witness_program(0, sha256(&ms.encode_script().to_bytes()).as_ref())
            }
            ShInner::SortedMulti(k, keys) => multisig_script(*k, keys, true)?.to_bytes(),
            ShInner::Ms(ms) => ms.encode_script().to_bytes(),
        })
    }
}

impl Key {
    /// The 32 x-only bytes, dropping the parity prefix of a full key.
    pub fn x_only_bytes(&self) -> [u8; 32] {
        match self {
            Key::Full(bytes) => {
                let mut out = [0u8; 32];
                out.copy_from_slice(&bytes[1..]);
                out
            }
            Key::XOnly(bytes) => *bytes,
        }
    }
}

fn leaf_key(tree: &TokenTree) -> Result<Key, Error> {
    if !tree.children.is_empty() {
        return Err(Error::InvalidKey(tree.name.clone()));
    }
    tree.name.parse()
}

fn multi_args(children: &[TokenTree]) -> Result<(usize, Vec<Key>), Error> {
    let k: usize = children[0]
        .name
        .parse()
        .map_err(|_| Error::InvalidNumber(children[0].name.clone()))?;
    let keys = children[1..]
        .iter()
        .map(leaf_key)
        .collect::<Result<Vec<_>, _>>()?;
    if k == 0 || k > keys.len() || keys.len() > 20 {
        return Err(Error::InvalidThreshold { k, n: keys.len() });
    }
    Ok((k, keys))
}

fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut out = Vec::with_capacity(25);
    out.extend_from_slice(&[opcodes::OP_DUP, opcodes::OP_HASH160, 0x14]);
    out.extend_from_slice(hash);
    out.extend_from_slice(&[opcodes::OP_EQUALVERIFY, opcodes::OP_CHECKSIG]);
    out
}

fn witness_program(version: u8, program: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + program.len());
    out.push(if version == 0 { 0x00 } else { 0x50 + version });
    out.push(program.len() as u8);
    out.extend_from_slice(program);
    out
}

fn multisig_script(k: usize, keys: &[Key], sorted: bool) -> Result<Script, Error> {
    if keys.iter().any(Key::is_x_only) {
        return Err(Error::TypeCheck {
            fragment: "multi",
            reason: "CHECKMULTISIG requires full keys".to_string(),
        });
    }
    let mut ordered: Vec<&Key> = keys.iter().collect();
    if sorted {
        // lexicographic over the compressed encodings
        ordered.sort_by_key(|key| key.push_bytes());
    }
    let mut script = Script::new();
    script.push_int(k as i64);
    for key in ordered {
        script.push_slice(&key.push_bytes());
    }
    script.push_int(keys.len() as i64);
    script.push_opcode(opcodes::OP_CHECKMULTISIG);
    Ok(script)
}

// -- checksum ----------------------------------------------------------

/// Characters a descriptor body may contain, in class order.
const INPUT_CHARSET: &str = "0123456789()[],'/*abcdefgh@:$%{}IJKLMNOPQRSTUVWXYZ&+-.;<=>?!^_|~ijklmnopqrstuvwxyzABCDEFGH`#\"\\ ";

/// The 32-symbol output alphabet of the checksum.
const CHECKSUM_CHARSET: &[u8; 32] = b"023456789acdefghjklmnpqrstuvwxyz";

fn polymod(mut c: u64, val: u64) -> u64 {
    let c0 = c >> 35;
    c = ((c & 0x7_ffff_ffff) << 5) ^ val;
    if c0 & 1 != 0 {
        c ^= 0xf5_dee5_1989;
    }
    if c0 & 2 != 0 {
        c ^= 0xa9_fdca_3312;
    }
    if c0 & 4 != 0 {
        c ^= 0x1b_ab10_e32d;
    }
    if c0 & 8 != 0 {
        c ^= 0x37_06b1_677a;
    }
    if c0 & 16 != 0 {
        c ^= 0x64_4d62_6ffd;
    }
    c
}

/// The 8-symbol checksum of a descriptor body.
pub fn checksum(body: &str) -> Result<String, Error> {
    let mut c: u64 = 1;
    let mut cls: u64 = 0;
    let mut cls_count = 0;
    for ch in body.chars() {
        let pos = INPUT_CHARSET
            .find(ch)
            .ok_or(Error::InvalidDescriptorCharacter(ch))? as u64;
        c = polymod(c, pos & 31);
        cls = cls * 3 + (pos >> 5);
        cls_count += 1;
        if cls_count == 3 {
            c = polymod(c, cls);
            cls = 0;
            cls_count = 0;
        }
    }
    if cls_count > 0 {
        c = polymod(c, cls);
    }
    for _ in 0..8 {
        c = polymod(c, 0);
    }
    c ^= 1;

    let mut out = String::with_capacity(8);
    for i in 0..8 {
        let idx = ((c >> (5 * (7 - i))) & 31) as usize;
        out.push(CHECKSUM_CHARSET[idx] as char);
    }
    Ok(out)
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Pk(key) => write!(f, "pk({key})"),
            Descriptor::Pkh(key) => write!(f, "pkh({key})"),
            Descriptor::Wpkh(key) => write!(f, "wpkh({key})"),
            Descriptor::Sh(inner) => write!(f, "sh({inner})"),
            Descriptor::Wsh(ms) => write!(f, "wsh({ms})"),
            Descriptor::Tr(key, None) => write!(f, "tr({key})"),
            Descriptor::Tr(key, Some(tree)) => write!(f, "tr({key},{tree})"),
            Descriptor::Multi { sorted, k, keys } => {
                write!(f, "{}({k}", if *sorted { "sortedmulti" } else { "multi" })?;
                for key in keys {
                    write!(f, ",{key}")?;
                }
                write!(f, ")")
            }
            Descriptor::Addr(address) => {
                let text = address.encode().map_err(|_| fmt::Error)?;
                write!(f, "addr({text})")
            }
            Descriptor::Raw(bytes) => write!(f, "raw({})", hex::encode(bytes)),
        }
    }
}

impl fmt::Display for ShInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShInner::Wpkh(key) => write!(f, "wpkh({key})"),
            ShInner::Wsh(ms) => write!(f, "wsh({ms})"),
            ShInner::SortedMulti(k, keys) => {
                write!(f, "sortedmulti({k}")?;
                for key in keys {
                    write!(f, ",{key}")?;
                }
                write!(f, ")")
            }
            ShInner::Ms(ms) => write!(f, "{ms}"),
        }
    }
}

impl fmt::Display for TapScriptTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapScriptTree::Leaf(ms) => write!(f, "{ms}"),
            TapScriptTree::Branch(l, r) => write!(f, "{{{l},{r}}}"),
        }
    }
}
