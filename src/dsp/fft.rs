//! In-place inverse real FFT used to synthesize band-limited noise.
//!
//! Input layout: the real part of bin `i` at index `i` (0 ..= n/2) and the
//! imaginary part at `n - i`. Output is the time-domain signal, unscaled.

use std::f64::consts::PI;

/// Largest length `reverse_index_bits` supports.
const MAX_BITS: u32 = 16;

/// Run the transform. `array.len()` must be a power of two between 4 and 2^16;
/// other lengths are left untouched and reported as `false`.
pub fn inverse_real_fourier_transform(array: &mut [f32]) -> bool {
    let full_length = array.len();
    if full_length < 4 || !full_length.is_power_of_two() || full_length.trailing_zeros() > MAX_BITS {
        return false;
    }
    let total_passes = full_length.trailing_zeros();

    for pass in (2..total_passes).rev() {
        let sub_stride = 1usize << pass;
        let mid_sub_stride = sub_stride >> 1;
        let stride = sub_stride << 1;
        let radians_increment = PI * 2.0 / stride as f64;
        let cos_increment = radians_increment.cos();
        let sin_increment = radians_increment.sin();
        let oscillator_multiplier = 2.0 * cos_increment;

        for start_a in (0..full_length).step_by(stride) {
            let mid_a = start_a + mid_sub_stride;
            let start_b = start_a + sub_stride;
            let mid_b = start_b + mid_sub_stride;
            let stop = start_b + sub_stride;

            let real_start_a = array[start_a];
            let imag_start_b = array[start_b];
            array[start_a] = real_start_a + imag_start_b;
            array[mid_a] *= 2.0;
            array[start_b] = real_start_a - imag_start_b;
            array[mid_b] *= 2.0;

            // Twiddle factors advance with a second-order oscillator.
            let mut c = cos_increment;
            let mut s = -sin_increment;
            let mut c_prev = 1.0;
            let mut s_prev = 0.0;
            for index in 1..mid_sub_stride {
                let a0 = start_a + index;
                let a1 = start_b - index;
                let b0 = start_b + index;
                let b1 = stop - index;
                let real0 = array[a0] as f64;
                let real1 = array[a1] as f64;
                let imag0 = array[b0] as f64;
                let imag1 = array[b1] as f64;
                let temp_a = real0 - real1;
                let temp_b = imag0 + imag1;
                array[a0] = (real0 + real1) as f32;
                array[a1] = (imag1 - imag0) as f32;
                array[b0] = (temp_a * c - temp_b * s) as f32;
                array[b1] = (temp_b * c + temp_a * s) as f32;

                let c_next = oscillator_multiplier * c - c_prev;
                let s_next = oscillator_multiplier * s - s_prev;
                c_prev = c;
                s_prev = s;
                c = c_next;
                s = s_next;
            }
        }
    }

    for chunk in array.chunks_exact_mut(4) {
        let real0 = chunk[0];
        let real1 = chunk[1] * 2.0;
        let imag2 = chunk[2];
        let imag3 = chunk[3] * 2.0;
        let temp_a = real0 + imag2;
        let temp_b = real0 - imag2;
        chunk[0] = temp_a + real1;
        chunk[1] = temp_a - real1;
        chunk[2] = temp_b + imag3;
        chunk[3] = temp_b - imag3;
    }

    reverse_index_bits(array, total_passes);
    true
}

/// Permute `array` so each element moves to its bit-reversed index.
fn reverse_index_bits(array: &mut [f32], bit_count: u32) {
    let final_shift = MAX_BITS - bit_count;
    for i in 0..array.len() {
        let j = ((i as u16).reverse_bits() >> final_shift) as usize;
        if j > i {
            array.swap(i, j);
        }
    }
}
