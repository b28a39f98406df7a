/// Join decoded slices into one sentence waveform of at most `audio_len` samples.
///
/// With `pad_size > 0` the last `pad_size` samples of each segment are averaged
/// with the first `pad_size` samples of the next one, and those leading samples
/// are then dropped from the next segment. The pad shrinks to fit segments
/// shorter than it.
pub fn merge_sub_audio(mut segments: Vec<Vec<f32>>, pad_size: usize, audio_len: usize) -> Vec<f32> {
    let mut skip = vec![0usize; segments.len()];

    if pad_size > 0 {
        for i in 0..segments.len().saturating_sub(1) {
            let (left, right) = segments.split_at_mut(i + 1);
            let cur = &mut left[i];
            let next = &right[0];

            let k = pad_size.min(cur.len() - skip[i]).min(next.len());
            let tail = cur.len() - k;
            for (a, &b) in cur[tail..].iter_mut().zip(&next[..k]) {
                *a = (*a + b) / 2.0;
            }
            skip[i + 1] = k;
        }
    }

    let total: usize = segments.iter().zip(&skip).map(|(s, &k)| s.len() - k).sum();
    let mut out = Vec::with_capacity(total.min(audio_len));
    for (segment, &k) in segments.iter().zip(&skip) {
        out.extend_from_slice(&segment[k..]);
    }
    out.truncate(audio_len);
    out
}
