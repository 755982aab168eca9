//! Channelizer: frequency translation plus rational rate conversion
//!
//! Down path (`push`): mix the selected offset to 0 Hz at the baseband rate,
//! then decimate through `k` half-band stages and an optional odd stage.
//! Up path (`pull`): the mirror image, interpolating channel samples and
//! mixing them up to the offset.
//!
//! Supported factors are `2^k × m` with `m` in `ODD_FACTORS`. A single
//! instance carries filter state for one direction only.

use std::collections::VecDeque;

use crate::domain::{ChannelInfo, PipelineError, PipelineResult, Sample};

use super::filter::FirFilter;
use super::halfband::HalfBand;
use super::nco::Nco;

/// Odd factors realised by the windowed-sinc stage
pub const ODD_FACTORS: [u32; 3] = [1, 3, 5];

/// Largest number of half-band stages
pub const MAX_HALFBAND_STAGES: u32 = 6;

/// Taps per unit of odd factor in the odd stage
const ODD_TAPS_PER_FACTOR: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResamplePlan {
    log2: u32,
    odd: u32,
}

impl ResamplePlan {
    const UNITY: ResamplePlan = ResamplePlan { log2: 0, odd: 1 };

    fn factor(&self) -> u32 {
        (1 << self.log2) * self.odd
    }

    fn derive(baseband: u32, channel: u32) -> PipelineResult<Self> {
        let unsupported = PipelineError::UnsupportedRatio { baseband, channel };
        if channel == 0 || channel > baseband || baseband % channel != 0 {
            return Err(unsupported);
        }
        let factor = baseband / channel;
        let log2 = factor.trailing_zeros();
        let odd = factor >> log2;
        if log2 > MAX_HALFBAND_STAGES || !ODD_FACTORS.contains(&odd) {
            return Err(unsupported);
        }
        Ok(Self { log2, odd })
    }
}

pub struct Channelizer {
    baseband_rate: Option<u32>,
    requested_rate: u32,
    requested_offset: i64,
    channel_rate: u32,
    offset: i64,
    plan: ResamplePlan,
    nco: Nco,
    halfbands: Vec<HalfBand>,
    odd_stage: Option<FirFilter>,
    odd_phase: u32,
    /// Up-converted samples not yet handed out by `pull`
    pending: VecDeque<Sample>,
    scratch: Vec<Sample>,
}

impl Channelizer {
    /// Unconfigured channelizer; `set_baseband_sample_rate` must come first
    pub fn new() -> Self {
        Self {
            baseband_rate: None,
            requested_rate: 0,
            requested_offset: 0,
            channel_rate: 0,
            offset: 0,
            plan: ResamplePlan::UNITY,
            nco: Nco::new(0.0, 1.0),
            halfbands: Vec::new(),
            odd_stage: None,
            odd_phase: 0,
            pending: VecDeque::new(),
            scratch: Vec::new(),
        }
    }

    /// Apply an upstream rate change.
    ///
    /// The last requested channelization is re-derived for the new rate. When
    /// it no longer divides evenly the channel falls back to the full rate.
    pub fn set_baseband_sample_rate(&mut self, rate: u32) {
        self.baseband_rate = Some(rate);
        let target = if self.requested_rate == 0 { rate } else { self.requested_rate };
        let plan = match ResamplePlan::derive(rate, target) {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("{e}; channel falls back to the baseband rate");
                ResamplePlan::UNITY
            }
        };
        self.install(rate, plan);
    }

    /// Select channel rate and offset.
    ///
    /// Fails, keeping the previous state, when `channel_rate` is not a
    /// supported fraction of the baseband rate. An offset outside the band
    /// is clamped, not rejected; read back the achieved value. The channel
    /// must fit inside the baseband, so the limit is
    /// `(baseband - channel) / 2`; at factor 1 nothing is filtered and any
    /// shift up to `baseband / 2` is kept.
    pub fn set_channelization(
        &mut self,
        channel_rate: u32,
        frequency_offset: i64,
    ) -> PipelineResult<ChannelInfo> {
        let baseband = self.baseband_rate.ok_or(PipelineError::BasebandRateUnknown)?;
        let plan = ResamplePlan::derive(baseband, channel_rate)?;
        self.requested_rate = channel_rate;
        self.requested_offset = frequency_offset;
        self.install(baseband, plan);
        Ok(self.info())
    }

    /// Check a ratio without touching any state
    pub fn supports(baseband_rate: u32, channel_rate: u32) -> PipelineResult<()> {
        ResamplePlan::derive(baseband_rate, channel_rate).map(|_| ())
    }

    pub fn get_channel_sample_rate(&self) -> u32 {
        self.channel_rate
    }

    pub fn get_channel_frequency_offset(&self) -> i64 {
        self.offset
    }

    pub fn baseband_sample_rate(&self) -> Option<u32> {
        self.baseband_rate
    }

    /// Total rate conversion factor between baseband and channel
    pub fn factor(&self) -> u32 {
        self.plan.factor()
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            baseband_rate: self.baseband_rate.unwrap_or(0),
            channel_rate: self.channel_rate,
            frequency_offset: self.offset,
        }
    }

    /// Clear filter delay lines, oscillator phase and the up-path backlog
    pub fn reset(&mut self) {
        for hb in &mut self.halfbands {
            hb.reset();
        }
        if let Some(fir) = &mut self.odd_stage {
            fir.reset();
        }
        self.odd_phase = 0;
        self.nco.reset();
        self.pending.clear();
    }

    /// Down-convert baseband samples, appending channel samples to `out`.
    /// Returns the number of samples appended.
    pub fn push(&mut self, input: &[Sample], out: &mut Vec<Sample>) -> usize {
        debug_assert!(self.baseband_rate.is_some(), "baseband rate must be set before push");
        if self.baseband_rate.is_none() {
            return 0;
        }
        let before = out.len();

        for &sample in input {
            let mut value = Some(self.nco.mix_down(sample));
            for hb in &mut self.halfbands {
                value = match value {
                    Some(v) => hb.decimate(v),
                    None => break,
                };
            }
            let Some(v) = value else { continue };

            match &mut self.odd_stage {
                None => out.push(v),
                Some(fir) => {
                    fir.push(v);
                    self.odd_phase += 1;
                    if self.odd_phase == self.plan.odd {
                        self.odd_phase = 0;
                        out.push(fir.output());
                    }
                }
            }
        }

        out.len() - before
    }

    /// Fill `out` with up-converted baseband samples, pulling channel
    /// samples from `source` as needed.
    pub fn pull(&mut self, out: &mut [Sample], source: &mut dyn FnMut(&mut [Sample])) {
        debug_assert!(self.baseband_rate.is_some(), "baseband rate must be set before pull");
        if self.baseband_rate.is_none() {
            out.fill(Sample::new(0.0, 0.0));
            return;
        }

        let factor = self.plan.factor() as usize;
        let mut filled = 0;

        while filled < out.len() {
            if self.pending.is_empty() {
                let needed = (out.len() - filled).div_ceil(factor);
                let mut input = std::mem::take(&mut self.scratch);
                input.clear();
                input.resize(needed, Sample::new(0.0, 0.0));
                source(&mut input);
                for &sample in &input {
                    self.upconvert(sample);
                }
                self.scratch = input;
            }
            while filled < out.len() {
                match self.pending.pop_front() {
                    Some(s) => {
                        out[filled] = s;
                        filled += 1;
                    }
                    None => break,
                }
            }
        }
    }

    fn upconvert(&mut self, sample: Sample) {
        let mut stage: Vec<Sample> = Vec::with_capacity(self.plan.factor() as usize);

        match &mut self.odd_stage {
            None => stage.push(sample),
            Some(fir) => {
                let gain = self.plan.odd as f32;
                for j in 0..self.plan.odd {
                    let input = if j == 0 { sample * gain } else { Sample::new(0.0, 0.0) };
                    stage.push(fir.process(input));
                }
            }
        }

        for hb in self.halfbands.iter_mut().rev() {
            stage = stage.into_iter().flat_map(|s| hb.interpolate(s)).collect();
        }

        for s in stage {
            let mixed = self.nco.mix(s);
            self.pending.push_back(mixed);
        }
    }

    fn install(&mut self, baseband: u32, plan: ResamplePlan) {
        self.plan = plan;
        self.channel_rate = baseband / plan.factor();

        let limit = if plan.factor() == 1 {
            baseband as i64 / 2
        } else {
            (baseband as i64 - self.channel_rate as i64) / 2
        };
        self.offset = self.requested_offset.clamp(-limit, limit);
        if self.offset != self.requested_offset {
            log::warn!(
                "offset {} Hz outside the representable range, using {} Hz",
                self.requested_offset,
                self.offset
            );
        }

        self.nco = Nco::new(self.offset as f64, baseband as f64);
        self.halfbands = (0..plan.log2).map(|_| HalfBand::new()).collect();
        let intermediate = baseband >> plan.log2;
        self.odd_stage = (plan.odd > 1).then(|| {
            let cutoff = 0.4 * intermediate as f32 / plan.odd as f32;
            FirFilter::lowpass(
                cutoff,
                intermediate as f32,
                ODD_TAPS_PER_FACTOR * plan.odd as usize + 1,
            )
        });
        self.odd_phase = 0;
        self.pending.clear();

        log::info!(
            "channelizer: baseband {} Hz -> channel {} Hz (factor {}), offset {} Hz",
            baseband,
            self.channel_rate,
            plan.factor(),
            self.offset
        );
    }
}

impl Default for Channelizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrum::peak_frequency;

    fn tone(freq: f64, rate: f64, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / rate;
                Sample::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    #[test]
    fn test_plan_accepts_dyadic_and_odd_multiples() {
        assert_eq!(ResamplePlan::derive(960_000, 48_000).unwrap().factor(), 20);
        assert_eq!(ResamplePlan::derive(96_000, 32_000).unwrap().factor(), 3);
        assert_eq!(ResamplePlan::derive(1_024_000, 16_000).unwrap().factor(), 64);
    }

    #[test]
    fn test_plan_rejects_unsupported_ratios() {
        // 7 is not an allowed odd factor, 48k does not divide 100k
        assert!(ResamplePlan::derive(336_000, 48_000).is_err());
        assert!(ResamplePlan::derive(100_000, 48_000).is_err());
        assert!(ResamplePlan::derive(48_000, 96_000).is_err());
        assert!(ResamplePlan::derive(48_000, 0).is_err());
    }

    #[test]
    fn test_channelization_requires_baseband_rate() {
        let mut ch = Channelizer::new();
        assert!(matches!(
            ch.set_channelization(48_000, 0),
            Err(PipelineError::BasebandRateUnknown)
        ));
    }

    #[test]
    fn test_rejected_channelization_keeps_previous_state() {
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(192_000);
        ch.set_channelization(48_000, 10_000).unwrap();

        assert!(ch.set_channelization(44_100, 0).is_err());
        assert_eq!(ch.get_channel_sample_rate(), 48_000);
        assert_eq!(ch.get_channel_frequency_offset(), 10_000);
    }

    #[test]
    fn test_offset_tone_lands_at_dc() {
        let rate = 192_000.0;
        let offset = 30_000;
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(rate as u32);
        ch.set_channelization(48_000, offset).unwrap();

        let input = tone(offset as f64, rate, 4 * 4096);
        let mut out = Vec::new();
        ch.push(&input, &mut out);
        assert_eq!(out.len(), 4096);

        let found = peak_frequency(&out[1024..3072], 48_000.0);
        let bin = 48_000.0 / 2048.0;
        assert!(found.abs() <= bin, "tone should sit within one bin of 0 Hz, got {found}");
    }

    #[test]
    fn test_out_of_range_offset_is_clamped() {
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(48_000);
        let info = ch.set_channelization(12_000, 30_000).unwrap();
        assert_eq!(info.frequency_offset, 18_000);

        let info = ch.set_channelization(12_000, -40_000).unwrap();
        assert_eq!(info.frequency_offset, -18_000);
    }

    #[test]
    fn test_full_rate_channel_keeps_offset() {
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(48_000);
        let info = ch.set_channelization(48_000, 10_000).unwrap();
        assert_eq!(info.channel_rate, 48_000);
        assert_eq!(info.frequency_offset, 10_000);

        let info = ch.set_channelization(48_000, -30_000).unwrap();
        assert_eq!(info.frequency_offset, -24_000);
    }

    #[test]
    fn test_rate_change_rederives_factor() {
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(96_000);
        ch.set_channelization(48_000, 0).unwrap();
        assert_eq!(ch.factor(), 2);

        ch.set_baseband_sample_rate(192_000);
        assert_eq!(ch.factor(), 4);
        assert_eq!(ch.get_channel_sample_rate(), 48_000);

        // 44.1k cannot carry a 48k channel: fall back to the full rate
        ch.set_baseband_sample_rate(44_100);
        assert_eq!(ch.factor(), 1);
        assert_eq!(ch.get_channel_sample_rate(), 44_100);
    }

    #[test]
    fn test_pull_upconverts_to_offset() {
        let rate = 96_000.0;
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(rate as u32);
        ch.set_channelization(32_000, -12_000).unwrap();

        // Constant channel samples become a tone at the offset
        let mut out = vec![Sample::new(0.0, 0.0); 4096];
        ch.pull(&mut out, &mut |buf: &mut [Sample]| buf.fill(Sample::new(0.5, 0.0)));

        let found = peak_frequency(&out[1024..], rate);
        assert!((found + 12_000.0).abs() <= rate / 3072.0, "got {found}");
        let level = out[1024..].iter().map(|s| s.norm()).sum::<f32>() / 3072.0;
        assert!((level - 0.5).abs() < 0.02, "amplitude should be preserved, got {level}");
    }

    #[test]
    fn test_pull_handles_lengths_not_multiple_of_factor() {
        let mut ch = Channelizer::new();
        ch.set_baseband_sample_rate(80_000);
        ch.set_channelization(16_000, 0).unwrap();

        let mut requested = 0;
        let mut out = vec![Sample::new(0.0, 0.0); 7];
        for _ in 0..10 {
            ch.pull(&mut out, &mut |buf: &mut [Sample]| {
                requested += buf.len();
                buf.fill(Sample::new(1.0, 0.0));
            });
        }
        // 70 output samples at factor 5 need exactly 14 channel samples
        assert_eq!(requested, 14);
    }
}
