//! 3D panning, distance attenuation, doppler, and cone filtering
//!
//! The panner owns all listener state plus the global doppler factor, speed
//! of sound, and distance model. `compute_mix` is a pure function of that
//! state and one source's spatial parameters: it produces the stereo volume
//! matrix, the doppler pitch shift, and a lowpass amount for the cone filter.
//! The update pass calls it once per dirty source.
//!
//! Mono sources are panned constant-power across a virtual speaker layout and
//! folded down to stereo; stereo sources bypass spatialization entirely and
//! receive the plain gain product.

use glam::Vec3;

use crate::error::{Error, Result};

const HALF_PI: f32 = std::f32::consts::FRAC_PI_2;
const TWO_PI: f32 = std::f32::consts::TAU;

/// Stereo folddown weight for center/side/back feeds
const FOLDDOWN: f32 = 0.707;

// Virtual speaker indices for the pan layout
const SP_FL: usize = 0;
const SP_FR: usize = 1;
const SP_C: usize = 2;
const SP_SL: usize = 4;
const SP_SR: usize = 5;
const SP_BL: usize = 6;
const SP_BR: usize = 7;
const SP_COUNT: usize = 8;

/// Azimuth table for the pan layout, radians clockwise from front.
/// The first and last entries wrap the front pair so every angle in
/// [0, 2pi] lands between two neighbors.
const SPEAKER_ANGLES: [(f32, usize); 8] = [
    (-30.0 * std::f32::consts::PI / 180.0, SP_FL),
    (30.0 * std::f32::consts::PI / 180.0, SP_FR),
    (90.0 * std::f32::consts::PI / 180.0, SP_SR),
    (135.0 * std::f32::consts::PI / 180.0, SP_BR),
    (225.0 * std::f32::consts::PI / 180.0, SP_BL),
    (270.0 * std::f32::consts::PI / 180.0, SP_SL),
    (330.0 * std::f32::consts::PI / 180.0, SP_FL),
    (390.0 * std::f32::consts::PI / 180.0, SP_FR),
];

/// Distance attenuation models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceModel {
    None,
    Inverse,
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

/// Spatial inputs to `compute_mix`, a snapshot of one source's 3D state
#[derive(Debug, Clone, Copy)]
pub struct SpatialParams {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Cone axis; zero vector means omnidirectional
    pub direction: Vec3,
    /// Position/velocity are already listener-relative
    pub listener_relative: bool,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
    /// Cone angles in degrees
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
    /// Lowpass amount outside the cone, 1.0 = no filtering
    pub cone_outer_lowpass: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            listener_relative: false,
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            ref_distance: 1.0,
            max_distance: f32::MAX,
            rolloff: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            cone_outer_lowpass: 1.0,
        }
    }
}

/// Result of one mix computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixOutput {
    /// Left/right channel gains
    pub gains: [f32; 2],
    /// Pitch multiplier from relative motion; 0.0 means the effect is
    /// disabled and the caller substitutes 1.0
    pub doppler: f32,
    /// Cone lowpass amount, 1.0 = open
    pub lowpass: f32,
}

/// Listener state plus the global spatialization knobs
#[derive(Debug, Clone)]
pub struct Panner {
    position: Vec3,
    velocity: Vec3,
    forward: Vec3,
    up: Vec3,
    gain: f32,
    doppler_factor: f32,
    speed_of_sound: f32,
    distance_model: DistanceModel,
}

impl Default for Panner {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            gain: 1.0,
            doppler_factor: 1.0,
            speed_of_sound: 343.3,
            distance_model: DistanceModel::InverseClamped,
        }
    }
}

impl Panner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        check_finite(position, "listener position")?;
        self.position = position;
        Ok(())
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Listener velocity, rejected above the speed of sound
    pub fn set_velocity(&mut self, velocity: Vec3) -> Result<()> {
        check_finite(velocity, "listener velocity")?;
        if velocity.length_squared() > self.speed_of_sound * self.speed_of_sound {
            return Err(Error::InvalidValue(
                "listener velocity exceeds the speed of sound".to_string(),
            ));
        }
        self.velocity = velocity;
        Ok(())
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Orientation as forward and up vectors; both are normalized and must
    /// have nonzero length
    pub fn set_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<()> {
        check_finite(forward, "listener forward")?;
        check_finite(up, "listener up")?;
        let forward = forward
            .try_normalize()
            .ok_or_else(|| Error::InvalidValue("zero-length forward vector".to_string()))?;
        let up = up
            .try_normalize()
            .ok_or_else(|| Error::InvalidValue("zero-length up vector".to_string()))?;
        self.forward = forward;
        self.up = up;
        Ok(())
    }

    pub fn orientation(&self) -> (Vec3, Vec3) {
        (self.forward, self.up)
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::InvalidValue("negative listener gain".to_string()));
        }
        self.gain = gain;
        Ok(())
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_doppler_factor(&mut self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::InvalidValue("negative doppler factor".to_string()));
        }
        self.doppler_factor = factor;
        Ok(())
    }

    pub fn doppler_factor(&self) -> f32 {
        self.doppler_factor
    }

    pub fn set_speed_of_sound(&mut self, speed: f32) -> Result<()> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(Error::InvalidValue("negative speed of sound".to_string()));
        }
        self.speed_of_sound = speed;
        Ok(())
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) {
        self.distance_model = model;
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.distance_model
    }

    /// Compute the volume matrix, doppler shift, and cone lowpass for one
    /// source.
    ///
    /// Stereo content is not spatialized: it gets the listener gain times the
    /// clamped source gain on both channels, no doppler, no filtering.
    pub fn compute_mix(&self, p: &SpatialParams, channels: u16) -> Result<MixOutput> {
        check_finite(p.position, "source position")?;
        check_finite(p.velocity, "source velocity")?;
        check_finite(p.direction, "source direction")?;
        if p.ref_distance < 0.0 {
            return Err(Error::InvalidValue("negative reference distance".to_string()));
        }
        if p.max_distance < p.ref_distance {
            return Err(Error::InvalidValue(
                "max distance below reference distance".to_string(),
            ));
        }

        let source_gain = p.gain.clamp(p.min_gain, p.max_gain);

        if channels >= 2 {
            let g = self.gain * source_gain;
            return Ok(MixOutput {
                gains: [g, g],
                doppler: 0.0,
                lowpass: 1.0,
            });
        }

        let rel = if p.listener_relative {
            p.position
        } else {
            self.to_listener_space(p.position)
        };

        let attenuation = self.distance_gain(rel, p.ref_distance, p.max_distance, p.rolloff);
        let doppler = self.doppler_shift(rel, p.velocity);
        let (cone_gain, lowpass) = cone_filter(
            rel,
            p.direction,
            p.cone_inner_angle,
            p.cone_outer_angle,
            p.cone_outer_gain,
            p.cone_outer_lowpass,
        );
        let pan = speaker_volumes(rel);

        let total = self.gain * attenuation * cone_gain * source_gain;
        Ok(MixOutput {
            gains: [pan[0] * total, pan[1] * total],
            doppler,
            lowpass,
        })
    }

    /// Rotate a world position into the listener's frame: +x right, +y up,
    /// +z behind the listener (so a source dead ahead has negative z).
    fn to_listener_space(&self, position: Vec3) -> Vec3 {
        let rel = position - self.position;
        let right = self.forward.cross(self.up);
        Vec3::new(rel.dot(right), rel.dot(self.up), rel.dot(-self.forward))
    }

    fn distance_gain(&self, rel: Vec3, ref_distance: f32, max_distance: f32, rolloff: f32) -> f32 {
        if rolloff <= 0.0 {
            return 1.0;
        }

        let distance = rel.length();
        let mut gain = 1.0;
        match self.distance_model {
            DistanceModel::None => {}
            DistanceModel::Inverse | DistanceModel::InverseClamped => {
                let d = if self.distance_model == DistanceModel::InverseClamped {
                    distance.clamp(ref_distance, max_distance)
                } else {
                    distance
                };
                if ref_distance > 0.0 {
                    let rolled = ref_distance + (d - ref_distance) * rolloff;
                    if rolled > 0.0 {
                        gain = ref_distance / rolled;
                    }
                }
            }
            DistanceModel::Linear | DistanceModel::LinearClamped => {
                let d = if self.distance_model == DistanceModel::LinearClamped {
                    distance.clamp(ref_distance, max_distance)
                } else {
                    distance
                };
                if max_distance != ref_distance {
                    let attenuation = (d - ref_distance) / (max_distance - ref_distance) * rolloff;
                    gain = (1.0 - attenuation).max(0.0);
                }
            }
            DistanceModel::Exponent | DistanceModel::ExponentClamped => {
                let d = if self.distance_model == DistanceModel::ExponentClamped {
                    distance.clamp(ref_distance, max_distance)
                } else {
                    distance
                };
                if d > 0.0 && ref_distance > 0.0 {
                    gain = (d / ref_distance).powf(-rolloff);
                }
            }
        }
        gain
    }

    fn doppler_shift(&self, rel: Vec3, source_velocity: Vec3) -> f32 {
        if self.doppler_factor == 0.0 {
            return 0.0;
        }

        let to_listener = (-rel).normalize_or_zero();
        let v_listener = self.velocity.dot(to_listener);
        let v_source = source_velocity.dot(to_listener);

        self.doppler_factor * ((self.speed_of_sound - v_listener) / (self.speed_of_sound - v_source))
    }
}

fn check_finite(v: Vec3, what: &str) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidValue(format!("non-finite {what}")))
    }
}

/// Cone attenuation: interpolate volume and lowpass between the inner and
/// outer angles of the emission cone.
fn cone_filter(
    rel: Vec3,
    direction: Vec3,
    inner_angle: f32,
    outer_angle: f32,
    outer_gain: f32,
    outer_lowpass: f32,
) -> (f32, f32) {
    let axis = direction.normalize_or_zero();
    let to_listener = (-rel).normalize_or_zero();

    let dot = axis.dot(to_listener).clamp(-1.0, 1.0);
    let angle = if dot.abs() < f32::EPSILON {
        0.0
    } else {
        dot.acos().to_degrees()
    };

    if angle >= inner_angle && angle <= outer_angle {
        let span = outer_angle - inner_angle;
        let t = if span > 0.0 { (angle - inner_angle) / span } else { 0.0 };
        (
            1.0 + (outer_gain - 1.0) * t,
            1.0 + (outer_lowpass - 1.0) * t,
        )
    } else if angle > outer_angle {
        (outer_gain, outer_lowpass)
    } else {
        (1.0, 1.0)
    }
}

/// Constant-power pan across the virtual layout, folded down to stereo
fn speaker_volumes(rel: Vec3) -> [f32; 2] {
    let unit = rel.normalize_or_zero();

    // A source exactly at the listener emits from the front, not the rear.
    let mut azimuth = if unit == Vec3::ZERO {
        0.0
    } else {
        rel.x.atan2(-rel.z)
    };
    if azimuth < 0.0 {
        azimuth += TWO_PI;
    }

    let (s1, s2, t) = speaker_pair(azimuth);

    let mut feeds = [0.0f32; SP_COUNT];
    feeds[s1] = (t * HALF_PI).cos();
    feeds[s2] = (t * HALF_PI).sin();

    [
        feeds[SP_FL] + FOLDDOWN * (feeds[SP_C] + feeds[SP_SL] + feeds[SP_BL]),
        feeds[SP_FR] + FOLDDOWN * (feeds[SP_C] + feeds[SP_SR] + feeds[SP_BR]),
    ]
}

/// Find the speaker pair bracketing `azimuth` and the interpolation position
/// between them
fn speaker_pair(azimuth: f32) -> (usize, usize, f32) {
    let mut left = &SPEAKER_ANGLES[0];
    let mut right = &SPEAKER_ANGLES[1];
    for window in SPEAKER_ANGLES.windows(2) {
        left = &window[0];
        right = &window[1];
        if azimuth >= left.0 && azimuth < right.0 {
            break;
        }
    }
    let t = ((azimuth - left.0) / (right.0 - left.0)).clamp(0.0, 1.0);
    (left.1, right.1, t)
}
