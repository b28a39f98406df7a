//! Runs the decoder over a [`SlicePlan`].
//!
//! Every call gets a freshly zeroed `channels x dec_len` window. Frames past the
//! end of a slice stay zero and the matching audio is dropped before trimming.

use std::time::Instant;

use anyhow::anyhow;
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use tracing::{debug, warn};

use crate::error::{Result, SynthError};
use crate::planner::{SlicePlan, SliceSpec};
use crate::SAMPLES_PER_FRAME;

/// Latent-to-waveform model with a fixed input length.
pub trait DecoderModel: Send + Sync {
    /// `window` is `channels x dec_len`; must return `SAMPLES_PER_FRAME * dec_len` samples.
    fn decode(&self, window: ArrayView2<'_, f32>, style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>>;
}

impl<T: DecoderModel + ?Sized> DecoderModel for Box<T> {
    fn decode(&self, window: ArrayView2<'_, f32>, style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
        (**self).decode(window, style)
    }
}

impl<T: DecoderModel + ?Sized> DecoderModel for std::sync::Arc<T> {
    fn decode(&self, window: ArrayView2<'_, f32>, style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
        (**self).decode(window, style)
    }
}

fn check_latent(latent: &ArrayView2<'_, f32>, plan: &SlicePlan) -> Result<()> {
    if latent.ncols() != plan.total_frames() {
        return Err(SynthError::shape(format!(
            "latent has {} frames but the words expand to {}",
            latent.ncols(),
            plan.total_frames()
        )));
    }
    Ok(())
}

/// Decode one slice and trim the audio its neighbours also produce.
pub fn decode_slice<D: DecoderModel + ?Sized>(
    decoder: &D,
    latent: ArrayView2<'_, f32>,
    style: ArrayView1<'_, f32>,
    slice: &SliceSpec,
    dec_len: usize,
) -> Result<Vec<f32>> {
    if dec_len == 0 {
        return Err(SynthError::invalid_config("dec_len must be at least 1"));
    }
    if slice.frames.end > latent.ncols() {
        return Err(SynthError::shape(format!(
            "slice needs frames {:?} but the latent has {}",
            slice.frames,
            latent.ncols()
        )));
    }
    let emit_inside = slice.frames.start <= slice.emit.start
        && slice.emit.start <= slice.emit.end
        && slice.emit.end <= slice.frames.end;
    if !emit_inside {
        return Err(SynthError::shape(format!(
            "emitted frames {:?} fall outside decoded frames {:?}",
            slice.emit, slice.frames
        )));
    }
    if slice.frames.is_empty() {
        return Ok(Vec::new());
    }
    if slice.frame_len() > dec_len {
        warn!(
            frames = slice.frame_len(),
            dec_len,
            "slice exceeds decoder window, decoding in {} chunks",
            slice.frame_len().div_ceil(dec_len)
        );
    }

    let mut audio = Vec::with_capacity(slice.frame_len() * SAMPLES_PER_FRAME);
    for chunk_start in slice.frames.clone().step_by(dec_len) {
        let chunk_end = (chunk_start + dec_len).min(slice.frames.end);
        let len = chunk_end - chunk_start;

        let mut window = Array2::<f32>::zeros((latent.nrows(), dec_len));
        window
            .slice_mut(s![.., ..len])
            .assign(&latent.slice(s![.., chunk_start..chunk_end]));

        let out = decoder.decode(window.view(), style)?;
        if out.len() != dec_len * SAMPLES_PER_FRAME {
            return Err(SynthError::DecoderOutput {
                expected: dec_len * SAMPLES_PER_FRAME,
                actual: out.len(),
            });
        }
        audio.extend_from_slice(&out[..len * SAMPLES_PER_FRAME]);
    }

    Ok(audio[slice.sample_range()].to_vec())
}

/// Decode every slice in order.
pub fn decode_slices<D: DecoderModel + ?Sized>(
    decoder: &D,
    latent: ArrayView2<'_, f32>,
    style: ArrayView1<'_, f32>,
    plan: &SlicePlan,
) -> Result<Vec<Vec<f32>>> {
    check_latent(&latent, plan)?;

    let mut segments = Vec::with_capacity(plan.len());
    for (i, slice) in plan.iter().enumerate() {
        let start = Instant::now();
        segments.push(decode_slice(decoder, latent, style, slice, plan.dec_len())?);
        debug!(
            slice = i,
            frames = ?slice.frames,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "decoded slice"
        );
    }
    Ok(segments)
}

/// Same result as [`decode_slices`], with slices spread over scoped worker threads.
///
/// Each worker owns a contiguous run of result slots, so output order never
/// depends on completion order.
pub fn decode_slices_parallel<D: DecoderModel + ?Sized>(
    decoder: &D,
    latent: ArrayView2<'_, f32>,
    style: ArrayView1<'_, f32>,
    plan: &SlicePlan,
) -> Result<Vec<Vec<f32>>> {
    check_latent(&latent, plan)?;
    if plan.len() <= 1 {
        return decode_slices(decoder, latent, style, plan);
    }

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(plan.len());
    let per_worker = plan.len().div_ceil(workers);
    let dec_len = plan.dec_len();

    let mut slots: Vec<Option<Result<Vec<f32>>>> = (0..plan.len()).map(|_| None).collect();
    std::thread::scope(|scope| {
        for (slot_chunk, slice_chunk) in slots
            .chunks_mut(per_worker)
            .zip(plan.slices().chunks(per_worker))
        {
            scope.spawn(move || {
                for (slot, slice) in slot_chunk.iter_mut().zip(slice_chunk) {
                    let result = decode_slice(decoder, latent, style, slice, dec_len);
                    let failed = result.is_err();
                    *slot = Some(result);
                    if failed {
                        break;
                    }
                }
            });
        }
    });

    let mut segments = Vec::with_capacity(slots.len());
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(result) => segments.push(result?),
            None => return Err(SynthError::Model(anyhow!("slice {i} was never decoded"))),
        }
    }
    debug!(slices = segments.len(), workers, "decoded slices in parallel");
    Ok(segments)
}
