//! Partitioned convolution for the reverb bus.
//!
//! The impulse response is split into equal partitions, transformed once, and
//! convolved against a frequency-domain delay line of recent input spectra
//! (uniform partitioned overlap-save). Output lags the input by one partition;
//! the reverb tail makes that inaudible.

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Samples per partition. FFT frames are twice this long.
const PARTITION: usize = 256;

/// Per-channel convolution state.
struct ConvChannel {
    /// Spectra of the impulse response partitions, oldest first
    ir_spectra: Vec<Vec<Complex<f32>>>,
    /// Ring of recent input spectra; `head` is the newest
    fdl: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Input samples collected toward the next partition
    input_fifo: Vec<f32>,
    /// Previous partition, kept for overlap-save frame assembly
    prev_block: Vec<f32>,
    /// Convolved samples ready to emit
    output_fifo: VecDeque<f32>,
}

impl ConvChannel {
    fn new(num_partitions: usize, spectrum_len: usize) -> Self {
        Self {
            ir_spectra: Vec::with_capacity(num_partitions),
            fdl: vec![vec![Complex::default(); spectrum_len]; num_partitions],
            head: 0,
            input_fifo: Vec::with_capacity(PARTITION),
            prev_block: vec![0.0; PARTITION],
            output_fifo: VecDeque::with_capacity(2 * PARTITION),
        }
    }
}

/// Stereo FFT convolver with a fixed impulse response.
pub struct Convolver {
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    channels: [ConvChannel; 2],
    /// Scratch: time-domain frame, accumulated spectrum, inverse output
    frame: Vec<f32>,
    accum: Vec<Complex<f32>>,
    inverse_out: Vec<f32>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    /// Build a convolver from one impulse response per channel.
    ///
    /// The responses may differ in content but are padded to the same
    /// partition count. An empty response convolves to silence.
    pub fn new(ir_left: &[f32], ir_right: &[f32]) -> Self {
        let ir_len = ir_left.len().max(ir_right.len()).max(1);
        let num_partitions = ir_len.div_ceil(PARTITION);
        let fft_len = 2 * PARTITION;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);
        let spectrum_len = fft_len / 2 + 1;

        let mut conv = Self {
            fft_scratch: fft.make_scratch_vec(),
            ifft_scratch: ifft.make_scratch_vec(),
            frame: vec![0.0; fft_len],
            accum: vec![Complex::default(); spectrum_len],
            inverse_out: vec![0.0; fft_len],
            channels: [
                ConvChannel::new(num_partitions, spectrum_len),
                ConvChannel::new(num_partitions, spectrum_len),
            ],
            fft,
            ifft,
        };

        conv.load_ir(0, ir_left, num_partitions);
        conv.load_ir(1, ir_right, num_partitions);
        conv
    }

    /// Samples of delay the convolver adds to the wet path.
    pub fn latency_samples(&self) -> usize {
        PARTITION
    }

    fn load_ir(&mut self, channel: usize, ir: &[f32], num_partitions: usize) {
        let fft_len = self.frame.len();
        for p in 0..num_partitions {
            let start = p * PARTITION;
            let end = (start + PARTITION).min(ir.len());
            self.frame.fill(0.0);
            if start < ir.len() {
                self.frame[..end - start].copy_from_slice(&ir[start..end]);
            }
            let mut spectrum = vec![Complex::default(); fft_len / 2 + 1];
            self.fft
                .process_with_scratch(&mut self.frame, &mut spectrum, &mut self.fft_scratch)
                .unwrap();
            self.channels[channel].ir_spectra.push(spectrum);
        }
    }

    /// Convolve one completed partition of input for a channel.
    fn convolve_partition(&mut self, channel: usize) {
        let fft_len = self.frame.len();
        let ch = &mut self.channels[channel];

        // Overlap-save frame: previous partition followed by the new one
        self.frame[..PARTITION].copy_from_slice(&ch.prev_block);
        self.frame[PARTITION..].copy_from_slice(&ch.input_fifo);
        ch.prev_block.copy_from_slice(&ch.input_fifo);
        ch.input_fifo.clear();

        // Newest spectrum overwrites the oldest slot
        ch.head = (ch.head + 1) % ch.fdl.len();
        let head = ch.head;
        self.fft
            .process_with_scratch(&mut self.frame, &mut ch.fdl[head], &mut self.fft_scratch)
            .unwrap();

        // Multiply-accumulate across the delay line: partition k of the IR
        // pairs with the input spectrum from k partitions ago
        self.accum.fill(Complex::default());
        let num_partitions = ch.ir_spectra.len();
        for k in 0..num_partitions {
            let slot = (head + ch.fdl.len() - k) % ch.fdl.len();
            let x = &ch.fdl[slot];
            let h = &ch.ir_spectra[k];
            for (acc, (xv, hv)) in self.accum.iter_mut().zip(x.iter().zip(h.iter())) {
                *acc += xv * hv;
            }
        }

        self.ifft
            .process_with_scratch(&mut self.accum, &mut self.inverse_out, &mut self.ifft_scratch)
            .unwrap();

        // Overlap-save keeps only the second half; realfft leaves the
        // round trip scaled by the frame length
        let norm = 1.0 / fft_len as f32;
        for &s in &self.inverse_out[PARTITION..] {
            ch.output_fifo.push_back(s * norm);
        }
    }

    #[inline]
    fn push_sample(&mut self, channel: usize, sample: f32) -> f32 {
        // Emit before ingest so the wet path lags by exactly one partition;
        // silent until the first partition completes
        let out = self.channels[channel]
            .output_fifo
            .pop_front()
            .unwrap_or(0.0);
        self.channels[channel].input_fifo.push(sample);
        if self.channels[channel].input_fifo.len() == PARTITION {
            self.convolve_partition(channel);
        }
        out
    }

    /// Process a stereo block in place: input is consumed, the wet convolved
    /// signal is written back.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for s in left.iter_mut() {
            *s = self.push_sample(0, *s);
        }
        for s in right.iter_mut() {
            *s = self.push_sample(1, *s);
        }
    }

    /// Drop all buffered input and pending output.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            for spectrum in &mut ch.fdl {
                spectrum.fill(Complex::default());
            }
            ch.head = 0;
            ch.input_fifo.clear();
            ch.prev_block.fill(0.0);
            ch.output_fifo.clear();
        }
    }
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("partitions", &self.channels[0].ir_spectra.len())
            .field("partition_size", &PARTITION)
            .finish()
    }
}
