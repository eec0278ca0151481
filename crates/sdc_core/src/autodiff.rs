use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::num::FpCategory;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Forward-mode dual number: `re` carries the value, `du` the derivative.
///
/// Seeding `du = 1.0` in one input component and propagating through a
/// right-hand side yields one column of its Jacobian. The full [`Float`]
/// surface is implemented so any smooth `f` written against
/// [`crate::traits::Scalar`] differentiates without modification.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub re: f64,
    pub du: f64,
}

impl Dual {
    pub fn new(re: f64, du: f64) -> Self {
        Self { re, du }
    }

    /// A value with zero derivative part.
    pub fn constant(re: f64) -> Self {
        Self { re, du: 0.0 }
    }

    /// A value seeded as the differentiation variable.
    pub fn variable(re: f64) -> Self {
        Self { re, du: 1.0 }
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.du + rhs.du)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.du - rhs.du)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.re * rhs.re, self.re * rhs.du + self.du * rhs.re)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.re / rhs.re,
            (self.du * rhs.re - self.re * rhs.du) / (rhs.re * rhs.re),
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.du)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Piecewise-constant shift: the derivative passes through.
        Self::new(self.re % rhs.re, self.du)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.du == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Num for Dual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.re.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.re.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.re)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::constant(-0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn epsilon() -> Self {
        Self::constant(f64::EPSILON)
    }

    fn is_nan(self) -> bool {
        self.re.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.re.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.re.is_finite()
    }
    fn is_normal(self) -> bool {
        self.re.is_normal()
    }
    fn classify(self) -> FpCategory {
        self.re.classify()
    }
    fn is_sign_positive(self) -> bool {
        self.re.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.re.is_sign_negative()
    }

    // Rounding kills the derivative except for fract, which keeps it.
    fn floor(self) -> Self {
        Self::constant(self.re.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.re.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.re.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.re.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.re.fract(), self.du)
    }

    fn abs(self) -> Self {
        if self.re >= 0.0 {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.re.signum())
    }
    fn abs_sub(self, other: Self) -> Self {
        if self.re > other.re {
            self - other
        } else {
            Self::constant(0.0)
        }
    }
    fn max(self, other: Self) -> Self {
        if self.re >= other.re {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.re <= other.re {
            self
        } else {
            other
        }
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::new(1.0 / self.re, -self.du / (self.re * self.re))
    }

    fn powi(self, n: i32) -> Self {
        Self::new(
            self.re.powi(n),
            <f64 as From<i32>>::from(n) * self.re.powi(n - 1) * self.du,
        )
    }
    fn powf(self, n: Self) -> Self {
        let v = self.re.powf(n.re);
        Self::new(
            v,
            v * (n.du * self.re.ln() + n.re * self.du / self.re),
        )
    }
    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        Self::new(s, self.du / (2.0 * s))
    }
    fn cbrt(self) -> Self {
        let c = self.re.cbrt();
        Self::new(c, self.du / (3.0 * c * c))
    }
    fn hypot(self, other: Self) -> Self {
        let h = self.re.hypot(other.re);
        Self::new(h, (self.re * self.du + other.re * other.du) / h)
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        Self::new(e, e * self.du)
    }
    fn exp2(self) -> Self {
        let e = self.re.exp2();
        Self::new(e, e * std::f64::consts::LN_2 * self.du)
    }
    fn exp_m1(self) -> Self {
        Self::new(self.re.exp_m1(), self.re.exp() * self.du)
    }
    fn ln(self) -> Self {
        Self::new(self.re.ln(), self.du / self.re)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        Self::new(self.re.log2(), self.du / (self.re * std::f64::consts::LN_2))
    }
    fn log10(self) -> Self {
        Self::new(
            self.re.log10(),
            self.du / (self.re * std::f64::consts::LN_10),
        )
    }
    fn ln_1p(self) -> Self {
        Self::new(self.re.ln_1p(), self.du / (1.0 + self.re))
    }

    fn sin(self) -> Self {
        Self::new(self.re.sin(), self.re.cos() * self.du)
    }
    fn cos(self) -> Self {
        Self::new(self.re.cos(), -self.re.sin() * self.du)
    }
    fn tan(self) -> Self {
        let t = self.re.tan();
        Self::new(t, (1.0 + t * t) * self.du)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }
    fn asin(self) -> Self {
        Self::new(self.re.asin(), self.du / (1.0 - self.re * self.re).sqrt())
    }
    fn acos(self) -> Self {
        Self::new(self.re.acos(), -self.du / (1.0 - self.re * self.re).sqrt())
    }
    fn atan(self) -> Self {
        Self::new(self.re.atan(), self.du / (1.0 + self.re * self.re))
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.re * self.re + other.re * other.re;
        Self::new(
            self.re.atan2(other.re),
            (other.re * self.du - self.re * other.du) / denom,
        )
    }

    fn sinh(self) -> Self {
        Self::new(self.re.sinh(), self.re.cosh() * self.du)
    }
    fn cosh(self) -> Self {
        Self::new(self.re.cosh(), self.re.sinh() * self.du)
    }
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        Self::new(t, (1.0 - t * t) * self.du)
    }
    fn asinh(self) -> Self {
        Self::new(self.re.asinh(), self.du / (self.re * self.re + 1.0).sqrt())
    }
    fn acosh(self) -> Self {
        Self::new(self.re.acosh(), self.du / (self.re * self.re - 1.0).sqrt())
    }
    fn atanh(self) -> Self {
        Self::new(self.re.atanh(), self.du / (1.0 - self.re * self.re))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.re.integer_decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_arithmetic_derivatives() {
        let x = Dual::variable(3.0);
        let c = Dual::constant(2.0);

        let sum = x + c;
        assert!(close(sum.re, 5.0) && close(sum.du, 1.0));

        let prod = x * x;
        assert!(close(prod.re, 9.0) && close(prod.du, 6.0));

        let quot = c / x;
        assert!(close(quot.re, 2.0 / 3.0) && close(quot.du, -2.0 / 9.0));
    }

    #[test]
    fn test_elementary_derivatives() {
        let x = Dual::variable(0.7);

        let e = x.exp();
        assert!(close(e.du, 0.7f64.exp()));

        let s = x.sin();
        assert!(close(s.du, 0.7f64.cos()));

        let cube = x.powi(3);
        assert!(close(cube.du, 3.0 * 0.7f64 * 0.7f64));

        let r = x.sqrt();
        assert!(close(r.du, 0.5 / 0.7f64.sqrt()));

        let th = x.tanh();
        assert!(close(th.du, 1.0 - 0.7f64.tanh().powi(2)));
    }

    #[test]
    fn test_chain_through_generic_function() {
        fn f<T: crate::traits::Scalar>(t: T) -> T {
            t * t * t.sin()
        }
        let x = 1.3f64;
        let d = f(Dual::variable(x));
        let expected = 2.0 * x * x.sin() + x * x * x.cos();
        assert!(close(d.du, expected));
    }
}
