/// Voice-energy helpers shared by the phrase recorder and the energy scorer.
///
/// Chunks are raw little-endian 16-bit PCM. Energy is reported as
/// root-mean-square amplitude in sample units (0..=32767) so it compares
/// directly against the `silence_threshold` values the configuration
/// surface carries.

/// RMS amplitude of a PCM chunk.
///
/// Returns `None` when the chunk has an odd byte count and cannot be
/// decoded as 16-bit samples. An empty chunk reads as silence.
pub fn rms(chunk: &[u8]) -> Option<f32> {
    if chunk.len() % 2 != 0 {
        return None;
    }
    if chunk.is_empty() {
        return Some(0.0);
    }

    let count = (chunk.len() / 2) as f64;
    let sum_squares: f64 = chunk
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
            sample * sample
        })
        .sum();

    Some((sum_squares / count).sqrt() as f32)
}

/// RMS amplitude with the chunk's DC offset removed first.
///
/// Cheap stand-in for frontend preprocessing: a microphone with a DC bias
/// otherwise reads as permanently voiced.
pub fn rms_centered(chunk: &[u8]) -> Option<f32> {
    if chunk.len() % 2 != 0 {
        return None;
    }
    if chunk.is_empty() {
        return Some(0.0);
    }

    let count = (chunk.len() / 2) as f64;
    let mean: f64 = chunk
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64)
        .sum::<f64>()
        / count;

    let sum_squares: f64 = chunk
        .chunks_exact(2)
        .map(|pair| {
            let centered = i16::from_le_bytes([pair[0], pair[1]]) as f64 - mean;
            centered * centered
        })
        .sum();

    Some((sum_squares / count).sqrt() as f32)
}
