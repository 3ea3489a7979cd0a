//! Correctness and malleability typing.
//!
//! Every expression carries a base type (`B`, `V`, `K`, `W`) and a subset
//! of the properties `z`/`o`/`n`/`d`/`u`; combinators place requirements
//! on their children's types and compute the parent's from them. The
//! malleability triple `(dissat, safe, non_malleable)` rides along in the
//! same pass.

use std::fmt;

use crate::Error;

/// The four miniscript base types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Base {
    /// Leaves a boolean on the stack.
    B,
    /// Leaves nothing; aborts unless satisfied.
    V,
    /// Leaves a public key to be consumed by a later CHECKSIG.
    K,
    /// A wrapped expression cooperating with the element below it.
    W,
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Base::B => 'B',
            Base::V => 'V',
            Base::K => 'K',
            Base::W => 'W',
        };
        write!(f, "{c}")
    }
}

/// Base type plus correctness properties.
///
/// `z`: consumes no stack elements; `o`: consumes exactly one; `n`: a
/// satisfaction never starts with the empty element; `d`: a
/// dissatisfaction exists; `u`: satisfaction leaves exactly 1 on the
/// stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Type {
    pub base: Base,
    pub z: bool,
    pub o: bool,
    pub n: bool,
    pub d: bool,
    pub u: bool,
}

impl Type {
    pub const fn new(base: Base) -> Self {
        Type {
            base,
            z: false,
            o: false,
            n: false,
            d: false,
            u: false,
        }
    }

    fn is(self, base: Base) -> bool {
        self.base == base
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for (set, c) in [
            (self.z, 'z'),
            (self.o, 'o'),
            (self.n, 'n'),
            (self.d, 'd'),
            (self.u, 'u'),
        ] {
            if set {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Whether a dissatisfaction exists and whether it is canonical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dissat {
    /// No dissatisfaction at all.
    None,
    /// Exactly one dissatisfaction.
    Unique,
    /// Multiple or non-canonical dissatisfactions.
    Unknown,
}

/// Malleability data: third parties must not be able to mutate a
/// satisfaction without access to the signing keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Malleability {
    pub dissat: Dissat,
    /// Every satisfaction requires a signature.
    pub safe: bool,
    pub non_malleable: bool,
}

impl Malleability {
    const fn new(dissat: Dissat, safe: bool, non_malleable: bool) -> Self {
        Malleability {
            dissat,
            safe,
            non_malleable,
        }
    }
}

/// Dissatisfactions of two parts that must both be dissatisfied.
fn dissat_and(a: Dissat, b: Dissat) -> Dissat {
    match (a, b) {
        (Dissat::None, _) | (_, Dissat::None) => Dissat::None,
        (Dissat::Unique, Dissat::Unique) => Dissat::Unique,
        _ => Dissat::Unknown,
    }
}

/// Dissatisfactions reachable through either of two alternative paths.
fn dissat_or(a: Dissat, b: Dissat) -> Dissat {
    match (a, b) {
        (Dissat::None, Dissat::None) => Dissat::None,
        (Dissat::Unique, Dissat::None) | (Dissat::None, Dissat::Unique) => Dissat::Unique,
        _ => Dissat::Unknown,
    }
}

fn fail(fragment: &'static str, reason: impl Into<String>) -> Error {
    Error::TypeCheck {
        fragment,
        reason: reason.into(),
    }
}

// -- terminals ---------------------------------------------------------

pub fn true_type() -> (Type, Malleability) {
    (
        Type {
            z: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::None, false, true),
    )
}

pub fn false_type() -> (Type, Malleability) {
    (
        Type {
            z: true,
            u: true,
            d: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::Unique, true, true),
    )
}

pub fn pk_k_type() -> (Type, Malleability) {
    (
        Type {
            o: true,
            n: true,
            d: true,
            u: true,
            ..Type::new(Base::K)
        },
        Malleability::new(Dissat::Unique, true, true),
    )
}

pub fn pk_h_type() -> (Type, Malleability) {
    (
        Type {
            n: true,
            d: true,
            u: true,
            ..Type::new(Base::K)
        },
        Malleability::new(Dissat::Unique, true, true),
    )
}

pub fn time_type() -> (Type, Malleability) {
    (
        Type {
            z: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::None, false, true),
    )
}

pub fn hash_type() -> (Type, Malleability) {
    (
        Type {
            o: true,
            n: true,
            d: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::Unknown, false, true),
    )
}

pub fn multi_type() -> (Type, Malleability) {
    (
        Type {
            n: true,
            d: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::Unique, true, true),
    )
}

pub fn multi_a_type() -> (Type, Malleability) {
    (
        Type {
            d: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::Unique, true, true),
    )
}

// -- wrappers ----------------------------------------------------------

pub fn alt(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::B) {
        return Err(fail("a", format!("child must be B, got {xt}")));
    }
    Ok((
        Type {
            d: xt.d,
            u: xt.u,
            ..Type::new(Base::W)
        },
        xm,
    ))
}

pub fn swap(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::B) || !xt.o {
        return Err(fail("s", format!("child must be Bo, got {xt}")));
    }
    Ok((
        Type {
            d: xt.d,
            u: xt.u,
            ..Type::new(Base::W)
        },
        xm,
    ))
}

pub fn check(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::K) {
        return Err(fail("c", format!("child must be K, got {xt}")));
    }
    Ok((
        Type {
            o: xt.o,
            n: xt.n,
            d: xt.d,
            u: true,
            ..Type::new(Base::B)
        },
        xm,
    ))
}

pub fn dup_if(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::V) || !xt.z {
        return Err(fail("d", format!("child must be Vz, got {xt}")));
    }
    Ok((
        Type {
            o: true,
            n: true,
            d: true,
            ..Type::new(Base::B)
        },
        Malleability::new(Dissat::Unique, xm.safe, xm.non_malleable),
    ))
}

pub fn verify(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::B) {
        return Err(fail("v", format!("child must be B, got {xt}")));
    }
    Ok((
        Type {
            z: xt.z,
            o: xt.o,
            n: xt.n,
            ..Type::new(Base::V)
        },
        Malleability::new(Dissat::None, xm.safe, xm.non_malleable),
    ))
}

pub fn non_zero(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::B) || !xt.n {
        return Err(fail("j", format!("child must be Bn, got {xt}")));
    }
    let dissat = match xm.dissat {
        Dissat::None => Dissat::Unique,
        _ => Dissat::Unknown,
    };
    Ok((
        Type {
            o: xt.o,
            n: true,
            d: true,
            u: xt.u,
            ..Type::new(Base::B)
        },
        Malleability::new(dissat, xm.safe, xm.non_malleable),
    ))
}

pub fn zero_not_equal(x: (Type, Malleability)) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    if !xt.is(Base::B) {
        return Err(fail("n", format!("child must be B, got {xt}")));
    }
    Ok((
        Type {
            z: xt.z,
            o: xt.o,
            n: xt.n,
            d: xt.d,
            u: true,
            ..Type::new(Base::B)
        },
        xm,
    ))
}

// -- combinators -------------------------------------------------------

pub fn and_v(
    x: (Type, Malleability),
    y: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (yt, ym) = y;
    if !xt.is(Base::V) {
        return Err(fail("and_v", format!("left child must be V, got {xt}")));
    }
    if !matches!(yt.base, Base::B | Base::V | Base::K) {
        return Err(fail("and_v", format!("right child must be B/V/K, got {yt}")));
    }
    let dissat = match ym.dissat {
        Dissat::None => Dissat::None,
        _ => Dissat::Unknown,
    };
    Ok((
        Type {
            z: xt.z && yt.z,
            o: (xt.z && yt.o) || (xt.o && yt.z),
            n: xt.n || (xt.z && yt.n),
            d: false,
            u: yt.u,
            ..Type::new(yt.base)
        },
        Malleability::new(dissat, xm.safe || ym.safe, xm.non_malleable && ym.non_malleable),
    ))
}

pub fn and_b(
    x: (Type, Malleability),
    y: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (yt, ym) = y;
    if !xt.is(Base::B) || !yt.is(Base::W) {
        return Err(fail("and_b", format!("children must be B and W, got {xt} and {yt}")));
    }
    Ok((
        Type {
            z: xt.z && yt.z,
            o: (xt.z && yt.o) || (xt.o && yt.z),
            n: xt.n || (xt.z && yt.n),
            d: xt.d && yt.d,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(
            dissat_and(xm.dissat, ym.dissat),
            xm.safe || ym.safe,
            xm.non_malleable && ym.non_malleable,
        ),
    ))
}

pub fn and_or(
    x: (Type, Malleability),
    y: (Type, Malleability),
    z: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (yt, ym) = y;
    let (zt, zm) = z;
    if !xt.is(Base::B) || !xt.d || !xt.u {
        return Err(fail("andor", format!("condition must be Bdu, got {xt}")));
    }
    if yt.base != zt.base || !matches!(yt.base, Base::B | Base::V | Base::K) {
        return Err(fail(
            "andor",
            format!("branches must share a B/V/K type, got {yt} and {zt}"),
        ));
    }
    Ok((
        Type {
            z: xt.z && yt.z && zt.z,
            o: xt.z && yt.o && zt.o,
            n: xt.n,
            d: zt.d,
            u: yt.u && zt.u,
            ..Type::new(yt.base)
        },
        Malleability::new(
            dissat_and(xm.dissat, zm.dissat),
            (xm.safe || ym.safe) && zm.safe,
            xm.non_malleable && ym.non_malleable && zm.non_malleable && (xm.safe || ym.safe || zm.safe),
        ),
    ))
}

pub fn or_b(
    x: (Type, Malleability),
    z: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (zt, zm) = z;
    if !xt.is(Base::B) || !xt.d {
        return Err(fail("or_b", format!("left child must be Bd, got {xt}")));
    }
    if !zt.is(Base::W) || !zt.d {
        return Err(fail("or_b", format!("right child must be Wd, got {zt}")));
    }
    Ok((
        Type {
            z: xt.z && zt.z,
            o: (xt.z && zt.o) || (xt.o && zt.z),
            d: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(
            dissat_and(xm.dissat, zm.dissat),
            xm.safe && zm.safe,
            xm.non_malleable && zm.non_malleable && (xm.safe || zm.safe),
        ),
    ))
}

pub fn or_c(
    x: (Type, Malleability),
    z: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (zt, zm) = z;
    if !xt.is(Base::B) || !xt.d || !xt.u {
        return Err(fail("or_c", format!("left child must be Bdu, got {xt}")));
    }
    if !zt.is(Base::V) {
        return Err(fail("or_c", format!("right child must be V, got {zt}")));
    }
    Ok((
        Type {
            z: xt.z && zt.z,
            o: xt.o && zt.z,
            ..Type::new(Base::V)
        },
        Malleability::new(
            Dissat::None,
            xm.safe && zm.safe,
            xm.non_malleable && zm.non_malleable && (xm.safe || zm.safe),
        ),
    ))
}

pub fn or_d(
    x: (Type, Malleability),
    z: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (zt, zm) = z;
    if !xt.is(Base::B) || !xt.d || !xt.u {
        return Err(fail("or_d", format!("left child must be Bdu, got {xt}")));
    }
    if !zt.is(Base::B) {
        return Err(fail("or_d", format!("right child must be B, got {zt}")));
    }
    Ok((
        Type {
            z: xt.z && zt.z,
            o: xt.o && zt.z,
            d: zt.d,
            u: zt.u,
            ..Type::new(Base::B)
        },
        Malleability::new(
            dissat_and(xm.dissat, zm.dissat),
            xm.safe && zm.safe,
            xm.non_malleable && zm.non_malleable && (xm.safe || zm.safe),
        ),
    ))
}

pub fn or_i(
    x: (Type, Malleability),
    z: (Type, Malleability),
) -> Result<(Type, Malleability), Error> {
    let (xt, xm) = x;
    let (zt, zm) = z;
    if xt.base != zt.base || !matches!(xt.base, Base::B | Base::V | Base::K) {
        return Err(fail(
            "or_i",
            format!("branches must share a B/V/K type, got {xt} and {zt}"),
        ));
    }
    let x_dissat = if xt.d { xm.dissat } else { Dissat::None };
    let z_dissat = if zt.d { zm.dissat } else { Dissat::None };
    Ok((
        Type {
            o: xt.z && zt.z,
            d: xt.d || zt.d,
            u: xt.u && zt.u,
            ..Type::new(xt.base)
        },
        Malleability::new(
            dissat_or(x_dissat, z_dissat),
            xm.safe && zm.safe,
            xm.non_malleable && zm.non_malleable && (xm.safe || zm.safe),
        ),
    ))
}

pub fn thresh(
    k: usize,
    children: &[(Type, Malleability)],
) -> Result<(Type, Malleability), Error> {
    let n = children.len();
    if k == 0 || k > n {
        return Err(Error::InvalidThreshold { k, n });
    }
    for (i, (ct, _)) in children.iter().enumerate() {
        if i == 0 {
            if !ct.is(Base::B) || !ct.d || !ct.u {
                return Err(fail("thresh", format!("first child must be Bdu, got {ct}")));
            }
        } else if !ct.is(Base::W) || !ct.d || !ct.u {
            return Err(fail(
                "thresh",
                format!("child {i} must be Wdu, got {ct}"),
            ));
        }
    }

    let all_z = children.iter().all(|(t, _)| t.z);
    let non_z: Vec<&Type> = children.iter().map(|(t, _)| t).filter(|t| !t.z).collect();
    let o = non_z.len() == 1 && non_z[0].o;

    let safe_count = children.iter().filter(|(_, m)| m.safe).count();
    let all_nm = children
        .iter()
        .all(|(_, m)| m.non_malleable && m.dissat == Dissat::Unique);
    let dissat = if children.iter().all(|(_, m)| m.dissat == Dissat::Unique) {
        Dissat::Unique
    } else {
        Dissat::Unknown
    };

    Ok((
        Type {
            z: all_z,
            o,
            d: true,
            u: true,
            ..Type::new(Base::B)
        },
        Malleability::new(
            dissat,
            safe_count >= n - k + 1,
            all_nm && safe_count >= n - k,
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_pk_k_is_bondu() {
        let (ty, mall) = check(pk_k_type()).unwrap();
        assert_eq!(ty.base, Base::B);
        assert!(ty.o && ty.n && ty.d && ty.u);
        assert!(mall.safe);
    }

    #[test]
    fn and_v_takes_right_base() {
        let v = verify(check(pk_k_type()).unwrap()).unwrap();
        let (ty, _) = and_v(v, check(pk_k_type()).unwrap()).unwrap();
        assert_eq!(ty.base, Base::B);

        let (vy, _) = and_v(v, verify(hash_type()).unwrap()).unwrap();
        assert_eq!(vy.base, Base::V);
    }

    #[test]
    fn and_v_requires_v_left() {
        assert!(and_v(check(pk_k_type()).unwrap(), true_type()).is_err());
    }

    #[test]
    fn or_b_requires_dissatisfiable_children() {
        // older() has no dissatisfaction, so it cannot go under or_b
        let older = time_type();
        let wrapped = alt(hash_type()).unwrap();
        assert!(or_b(older, wrapped).is_err());
    }

    #[test]
    fn non_zero_requires_n() {
        // d:v:older is Bo but not n
        let d = dup_if(verify(time_type()).unwrap()).unwrap();
        let j = non_zero(d);
        // dup_if produces n, so this is fine; swap removes nothing
        assert!(j.is_ok());

        // and_b of two z-fragments is not n
        let zz = and_b(true_type(), alt(true_type()).unwrap()).unwrap();
        assert!(!zz.0.n);
        assert!(non_zero(zz).is_err());
    }

    #[test]
    fn thresh_bounds() {
        let b = check(pk_k_type()).unwrap();
        let w = alt(check(pk_k_type()).unwrap()).unwrap();
        assert!(thresh(0, &[b, w]).is_err());
        assert!(thresh(3, &[b, w]).is_err());
        let (ty, mall) = thresh(1, &[b, w]).unwrap();
        assert_eq!(ty.base, Base::B);
        assert!(ty.d && ty.u);
        assert!(mall.safe);
    }

    #[test]
    fn verify_drops_du() {
        let (ty, mall) = verify(hash_type()).unwrap();
        assert_eq!(ty.base, Base::V);
        assert!(!ty.d && !ty.u);
        assert_eq!(mall.dissat, Dissat::None);
    }
}
