use crate::constants::Degree;

/// Great-circle separation between two sky positions.
///
/// Uses the Vincenty formula, which stays accurate both for tiny separations
/// (sub-arcsecond matches) and for antipodal points.
///
/// Arguments
/// -----------------
/// * `ra1`, `dec1`: first position in degrees
/// * `ra2`, `dec2`: second position in degrees
///
/// Return
/// ----------
/// * The separation in degrees, in `[0, 180]`. NaN if any input is NaN.
pub fn angular_separation(ra1: Degree, dec1: Degree, ra2: Degree, dec2: Degree) -> Degree {
    let (sin_dra, cos_dra) = (ra2 - ra1).to_radians().sin_cos();
    let (sin_d1, cos_d1) = dec1.to_radians().sin_cos();
    let (sin_d2, cos_d2) = dec2.to_radians().sin_cos();

    let num1 = cos_d2 * sin_dra;
    let num2 = cos_d1 * sin_d2 - sin_d1 * cos_d2 * cos_dra;
    let denominator = sin_d1 * sin_d2 + cos_d1 * cos_d2 * cos_dra;

    num1.hypot(num2).atan2(denominator).to_degrees()
}
