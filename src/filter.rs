use crate::types::OrientationSample;
use glam::{EulerRot, Quat, Vec3};

/// Default smoothing rate in 1/s. Higher tracks the target more tightly.
pub const DEFAULT_SMOOTHING_RATE: f32 = 12.0;

/// Build the offset rotation from Euler angles in degrees.
///
/// Applied Z first, then X, then Y, the convention of the game engine the
/// rotation is handed to.
pub fn offset_from_euler_deg(degrees: [f32; 3]) -> Quat {
    let [x, y, z] = degrees.map(f32::to_radians);
    Quat::from_euler(EulerRot::YXZ, y, x, z)
}

/// Exponential slerp smoothing from the last rendered rotation toward the
/// latest sample.
///
/// Owned by the render tick. Never touched from the network thread.
#[derive(Debug, Clone)]
pub struct OrientationFilter {
    current: Quat,
    target: Quat,
    has_target: bool,
    rate: f32,
    offset: Quat,
}

impl OrientationFilter {
    pub fn new(rate: f32, euler_offset_deg: [f32; 3]) -> Self {
        Self {
            current: Quat::IDENTITY,
            target: Quat::IDENTITY,
            has_target: false,
            rate,
            offset: offset_from_euler_deg(euler_offset_deg),
        }
    }

    /// Take a new sample as the target: `offset * sample`.
    pub fn set_target(&mut self, sample: &OrientationSample) {
        self.target = (self.offset * sample.rotation()).normalize();
        self.has_target = true;
    }

    /// Advance by `dt` seconds and return the rotation to render.
    ///
    /// No-op until the first target arrives, and for `rate <= 0` or `dt <= 0`.
    pub fn tick(&mut self, dt: f32) -> Quat {
        if !self.has_target || !(self.rate > 0.0) || !(dt > 0.0) {
            return self.current;
        }
        let t = 1.0 - (-self.rate * dt).exp();
        self.current = self.current.slerp(self.target, t).normalize();
        self.current
    }

    pub fn current(&self) -> Quat {
        self.current
    }

    pub fn target(&self) -> Option<Quat> {
        self.has_target.then_some(self.target)
    }

    pub fn has_target(&self) -> bool {
        self.has_target
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    /// Change the Euler offset. Takes effect at the next `set_target`.
    pub fn set_euler_offset_deg(&mut self, degrees: [f32; 3]) {
        self.offset = offset_from_euler_deg(degrees);
    }

    /// Jump straight to a rotation, e.g. when the host recentres the camera.
    pub fn reset(&mut self, rotation: Quat) {
        self.current = rotation.normalize();
    }

    /// Current rotation as Euler angles in degrees, `[x, y, z]`.
    pub fn current_euler_deg(&self) -> Vec3 {
        let (y, x, z) = self.current.to_euler(EulerRot::YXZ);
        Vec3::new(x, y, z) * (180.0 / std::f32::consts::PI)
    }
}

impl Default for OrientationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_RATE, [0.0; 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(q: Quat) -> OrientationSample {
        OrientationSample::from_xyzw(q.to_array(), 0).unwrap()
    }

    /// Angle between two rotations in radians, accurate near zero.
    fn angle(a: Quat, b: Quat) -> f32 {
        let delta = a.conjugate() * b;
        2.0 * delta.xyz().length().min(1.0).asin()
    }

    #[test]
    fn test_no_motion_without_target() {
        let mut filter = OrientationFilter::default();
        assert_eq!(filter.tick(1.0), Quat::IDENTITY);
        assert!(filter.target().is_none());
    }

    #[test]
    fn test_converges_to_target() {
        let mut filter = OrientationFilter::new(12.0, [0.0; 3]);
        let target = Quat::from_rotation_y(1.2) * Quat::from_rotation_x(0.4);
        filter.set_target(&sample(target));

        for _ in 0..600 {
            filter.tick(1.0 / 60.0);
        }
        let error_deg = angle(filter.current(), target).to_degrees();
        assert!(error_deg < 0.1, "error {error_deg}°");
    }

    #[test]
    fn test_single_tick_is_partial() {
        let mut filter = OrientationFilter::new(12.0, [0.0; 3]);
        let target = Quat::from_rotation_z(1.0);
        filter.set_target(&sample(target));

        let after = filter.tick(1.0 / 60.0);
        let moved = angle(after, Quat::IDENTITY);
        let expected = 1.0 * (1.0 - (-12.0f32 / 60.0).exp());
        assert!((moved - expected).abs() < 1e-3);
    }

    #[test]
    fn test_zero_rate_freezes() {
        let mut filter = OrientationFilter::new(0.0, [0.0; 3]);
        filter.set_target(&sample(Quat::from_rotation_x(1.0)));
        for _ in 0..100 {
            assert_eq!(filter.tick(0.1), Quat::IDENTITY);
        }
        filter.set_target(&sample(Quat::from_rotation_y(2.0)));
        assert_eq!(filter.tick(10.0), Quat::IDENTITY);
    }

    #[test]
    fn test_non_positive_dt_is_noop() {
        let mut filter = OrientationFilter::default();
        filter.set_target(&sample(Quat::from_rotation_x(1.0)));
        assert_eq!(filter.tick(0.0), Quat::IDENTITY);
        assert_eq!(filter.tick(-1.0), Quat::IDENTITY);
        assert_eq!(filter.tick(f32::NAN), Quat::IDENTITY);
    }

    #[test]
    fn test_offset_is_pre_composed() {
        let mut filter = OrientationFilter::new(12.0, [0.0, 90.0, 0.0]);
        let raw = Quat::from_rotation_x(0.5);
        filter.set_target(&sample(raw));

        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2) * raw;
        let target = filter.target().unwrap();
        assert!(angle(target, expected) < 1e-4);
        assert!(angle(target, raw * Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)) > 0.1);
    }

    #[test]
    fn test_offset_euler_order() {
        // Z is applied first, then X, then Y.
        let q = offset_from_euler_deg([30.0, 45.0, 60.0]);
        let expected = Quat::from_rotation_y(45f32.to_radians())
            * Quat::from_rotation_x(30f32.to_radians())
            * Quat::from_rotation_z(60f32.to_radians());
        assert!(angle(q, expected) < 1e-5);
    }
}
