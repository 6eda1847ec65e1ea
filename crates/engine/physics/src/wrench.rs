use glam::DVec3;
use std::ops::{Add, AddAssign, Mul};

/// Resultant force and moment about a reference point, global frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactWrench {
    pub force: DVec3,
    pub moment: DVec3,
}

impl ContactWrench {
    pub const ZERO: Self = Self {
        force: DVec3::ZERO,
        moment: DVec3::ZERO,
    };

    /// Wrench of a force applied at `point`, taken about `reference`.
    pub fn at_point(force: DVec3, point: DVec3, reference: DVec3) -> Self {
        Self {
            force,
            moment: (point - reference).cross(force),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.force.is_finite() && self.moment.is_finite()
    }
}

impl Add for ContactWrench {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            force: self.force + rhs.force,
            moment: self.moment + rhs.moment,
        }
    }
}

impl AddAssign for ContactWrench {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.moment += rhs.moment;
    }
}

impl Mul<f64> for ContactWrench {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            force: self.force * rhs,
            moment: self.moment * rhs,
        }
    }
}

impl std::iter::Sum for ContactWrench {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
