use std::ops::{Add, Mul, Neg, Sub};

use crate::{fields::MpcField, PartyId};

/// Value share in SPDZ protocol: a share of `v` and a share of `k·v`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpdzShare<T> {
    pub(crate) value: T,
    pub(crate) mac: T,
}

impl<T: MpcField> SpdzShare<T> {
    pub fn new(value: T, mac: T) -> Self {
        Self { value, mac }
    }

    /// Share of a public constant. Party 1 holds the constant, all parties
    /// derive their MAC share from their own key share.
    pub fn from_public(constant: T, zero: T, key_share: &T, party_id: PartyId) -> Self {
        SpdzShare {
            mac: constant.clone() * key_share.clone(),
            value: if party_id == 1 { constant } else { zero },
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn mac(&self) -> &T {
        &self.mac
    }

    pub fn into_parts(self) -> (T, T) {
        (self.value, self.mac)
    }
}

impl<T: MpcField> Add for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn add(self, rhs: Self) -> Self::Output {
        SpdzShare {
            value: self.value + rhs.value,
            mac: self.mac + rhs.mac,
        }
    }
}

impl<T: MpcField> Sub for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        SpdzShare {
            value: self.value - rhs.value,
            mac: self.mac - rhs.mac,
        }
    }
}

impl<T: MpcField> Neg for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn neg(self) -> Self::Output {
        SpdzShare {
            value: -self.value,
            mac: -self.mac,
        }
    }
}

/// Multiplication by a public constant.
impl<T: MpcField> Mul<T> for SpdzShare<T> {
    type Output = SpdzShare<T>;
    fn mul(self, rhs: T) -> Self::Output {
        SpdzShare {
            value: self.value * rhs.clone(),
            mac: self.mac * rhs,
        }
    }
}
