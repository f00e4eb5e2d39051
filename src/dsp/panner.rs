//! Equal-power stereo panner (WebAudio `StereoPannerNode` law).

use std::f64::consts::FRAC_PI_2;

/// Pan a mono sample to a stereo pair. `pan` is in [-1, 1].
pub fn pan_mono(input: f64, pan: f64) -> (f64, f64) {
    let x = (pan.clamp(-1.0, 1.0) + 1.0) / 2.0;
    let angle = x * FRAC_PI_2;
    (input * angle.cos(), input * angle.sin())
}

/// Pan a stereo pair. Negative pan folds the right channel into the
/// left, positive pan folds the left into the right.
pub fn pan_stereo(left: f64, right: f64, pan: f64) -> (f64, f64) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let angle = (pan + 1.0) * FRAC_PI_2;
        (left + right * angle.cos(), right * angle.sin())
    } else {
        let angle = pan * FRAC_PI_2;
        (left * angle.cos(), right + left * angle.sin())
    }
}
