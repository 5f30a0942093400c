use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Max number of fractional digits we keep around.
pub const MAX_SCALE: u8 = 18;

/// Fixed point decimal with an i128 mantissa.
///
/// The represented value is `value / 10^scale`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    pub value: i128,
    pub scale: u8,
}

impl Decimal {
    pub const fn new(value: i128, scale: u8) -> Self {
        Decimal { value, scale }
    }

    pub const fn from_i64(v: i64) -> Self {
        Decimal {
            value: v as i128,
            scale: 0,
        }
    }

    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        // Go through the shortest round-trip representation so that 0.1
        // becomes 0.1 and not 0.1000000000000000055511151231257827.
        Decimal::from_str(&v.to_string()).ok()
    }

    pub fn to_f64(&self) -> f64 {
        self.value as f64 / 10f64.powi(self.scale as i32)
    }

    /// Truncate towards zero.
    pub fn trunc_i64(&self) -> Option<i64> {
        let v = self.value / pow10(self.scale)?;
        i64::try_from(v).ok()
    }

    /// Rescale to a larger scale.
    pub fn rescale(&self, scale: u8) -> Option<Self> {
        match scale.cmp(&self.scale) {
            Ordering::Equal => Some(*self),
            Ordering::Greater => {
                let mul = pow10(scale - self.scale)?;
                Some(Decimal::new(self.value.checked_mul(mul)?, scale))
            }
            Ordering::Less => {
                let div = pow10(self.scale - scale)?;
                Some(Decimal::new(self.value / div, scale))
            }
        }
    }

    /// Remove trailing zeros from the fractional part.
    pub fn normalize(&self) -> Self {
        let mut d = *self;
        while d.scale > 0 && d.value % 10 == 0 {
            d.value /= 10;
            d.scale -= 1;
        }
        d
    }

    fn aligned(a: &Self, b: &Self) -> Option<(i128, i128, u8)> {
        let scale = a.scale.max(b.scale);
        Some((a.rescale(scale)?.value, b.rescale(scale)?.value, scale))
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let (a, b, scale) = Self::aligned(self, other)?;
        Some(Decimal::new(a.checked_add(b)?, scale))
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let (a, b, scale) = Self::aligned(self, other)?;
        Some(Decimal::new(a.checked_sub(b)?, scale))
    }

    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        let value = self.value.checked_mul(other.value)?;
        let d = Decimal::new(value, self.scale.checked_add(other.scale)?);
        if d.scale > MAX_SCALE {
            let n = d.normalize();
            n.rescale(n.scale.min(MAX_SCALE))
        } else {
            Some(d)
        }
    }

    /// Division producing at least six fractional digits.
    ///
    /// Returns None on division by zero or overflow.
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.value == 0 {
            return None;
        }
        let scale = self.scale.max(6);
        let exp = other.scale + scale - self.scale;
        let num = self.value.checked_mul(pow10(exp)?)?;
        Some(Decimal::new(num / other.value, scale).normalize())
    }

    pub fn checked_rem(&self, other: &Self) -> Option<Self> {
        let (a, b, scale) = Self::aligned(self, other)?;
        Some(Decimal::new(a.checked_rem(b)?, scale))
    }

    pub fn checked_neg(&self) -> Option<Self> {
        Some(Decimal::new(self.value.checked_neg()?, self.scale))
    }

    /// Round half away from zero to `digits` fractional digits.
    pub fn round(&self, digits: u8) -> Self {
        if digits >= self.scale {
            return *self;
        }
        let Some(div) = pow10(self.scale - digits) else {
            return *self;
        };
        let half = div / 2;
        let rem = self.value % div;
        let mut v = self.value / div;
        if rem.abs() >= half {
            v += self.value.signum();
        }
        Decimal::new(v, digits)
    }
}

fn pow10(exp: u8) -> Option<i128> {
    10i128.checked_pow(exp as u32)
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match Self::aligned(self, other) {
            Some((a, b, _)) => a.cmp(&b),
            None => self.to_f64().total_cmp(&other.to_f64()),
        }
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let n = self.normalize();
        n.value.hash(state);
        n.scale.hash(state);
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let s = self.value.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if s.len() <= scale {
            format!("{}{}", "0".repeat(scale - s.len() + 1), s)
        } else {
            s
        };
        let (int, frac) = padded.split_at(padded.len() - scale);
        let sign = if self.value < 0 { "-" } else { "" };
        write!(f, "{sign}{int}.{frac}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseDecimalError;

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (neg, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int, frac) = match digits.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (digits, ""),
        };

        if int.is_empty() && frac.is_empty() {
            return Err(ParseDecimalError);
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(ParseDecimalError);
        }
        if frac.len() > MAX_SCALE as usize {
            return Err(ParseDecimalError);
        }

        let mut value: i128 = 0;
        for c in int.chars().chain(frac.chars()) {
            let d = (c as u8 - b'0') as i128;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or(ParseDecimalError)?;
        }

        if neg {
            value = -value;
        }

        Ok(Decimal::new(value, frac.len() as u8))
    }
}
