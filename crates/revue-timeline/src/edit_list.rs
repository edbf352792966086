//! Flattened edit list: clip sections laid end to end.
//!
//! The list keeps a prefix-sum of native frame counts next to the sections
//! so that point lookups are a binary search rather than a scan.

use revue_core::{
    FrameRate, MediaId, RationalTime, Result, RevueError, TimeRange, TimeSourceMode, Timecode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One clip's placement in the flattened timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditListSection {
    /// Source that owns the frames of this section.
    pub media_id: MediaId,
    /// First source frame of the section.
    pub start: i64,
    /// Number of native frames, `[start, start + duration)`.
    pub duration: i64,
    /// Native frame rate of the section.
    pub rate: FrameRate,
    /// Timecode of the first frame.
    pub timecode: Timecode,
}

impl EditListSection {
    pub fn new(media_id: MediaId, start: i64, duration: i64, rate: FrameRate) -> Self {
        Self {
            media_id,
            start,
            duration,
            rate,
            timecode: Timecode::new(start, rate),
        }
    }

    pub fn with_timecode(mut self, timecode: Timecode) -> Self {
        self.timecode = timecode;
        self
    }

    /// Native running time of the section.
    pub fn native_duration(&self) -> RationalTime {
        RationalTime::from_frames(self.duration, self.rate)
    }

    /// Number of playback frames this section occupies.
    pub fn frames(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> i64 {
        match tsm {
            TimeSourceMode::Remapped => self.native_duration().to_frames(override_rate),
            TimeSourceMode::Fixed | TimeSourceMode::Dynamic => self.duration,
        }
    }

    /// Display period of one playback frame.
    pub fn frame_period(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> RationalTime {
        match tsm {
            TimeSourceMode::Dynamic => self.rate.frame_duration(),
            TimeSourceMode::Fixed | TimeSourceMode::Remapped => override_rate.frame_duration(),
        }
    }

    /// Rate in which playback frame numbers of this section are expressed.
    pub fn sampling_rate(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> FrameRate {
        match tsm {
            TimeSourceMode::Remapped => override_rate,
            TimeSourceMode::Fixed | TimeSourceMode::Dynamic => self.rate,
        }
    }

    /// Timeline time taken by the section.
    pub fn duration_time(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> RationalTime {
        self.frame_period(tsm, override_rate) * self.frames(tsm, override_rate)
    }
}

/// Ordered sequence of sections plus a cumulative frame index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditList {
    sections: Vec<EditListSection>,
    /// Cumulative native frame count at the end of each section.
    frame_ends: Vec<i64>,
}

impl EditList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: impl IntoIterator<Item = EditListSection>) -> Self {
        let mut list = Self::new();
        for section in sections {
            list.push(section);
        }
        list
    }

    /// Append a section. Sections without frames are never stored.
    pub fn push(&mut self, section: EditListSection) {
        if section.duration <= 0 {
            debug!(media = %section.media_id, "Dropping empty edit list section");
            return;
        }
        let end = self.total_native_frames() + section.duration;
        self.frame_ends.push(end);
        self.sections.push(section);
    }

    /// Append every section of `other`, in order.
    pub fn extend(&mut self, other: &EditList) {
        for section in &other.sections {
            self.push(section.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[EditListSection] {
        &self.sections
    }

    fn total_native_frames(&self) -> i64 {
        self.frame_ends.last().copied().unwrap_or(0)
    }

    fn section_start_frame(&self, index: usize) -> i64 {
        if index == 0 {
            0
        } else {
            self.frame_ends[index - 1]
        }
    }

    /// Index of the section containing `logical_frame`; frames before zero
    /// map to the first section, frames past the end to `len()`.
    fn section_index(&self, logical_frame: i64) -> usize {
        self.frame_ends.partition_point(|end| *end <= logical_frame)
    }

    pub fn duration_frames(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> i64 {
        match tsm {
            TimeSourceMode::Remapped => self
                .sections
                .iter()
                .map(|s| s.frames(tsm, override_rate))
                .sum(),
            TimeSourceMode::Fixed | TimeSourceMode::Dynamic => self.total_native_frames(),
        }
    }

    pub fn duration_time(&self, tsm: TimeSourceMode, override_rate: FrameRate) -> RationalTime {
        self.sections.iter().fold(RationalTime::ZERO, |acc, s| {
            acc + s.duration_time(tsm, override_rate)
        })
    }

    /// Playback frame count of every section, in order.
    pub fn frame_durations(
        &self,
        tsm: TimeSourceMode,
        override_rate: FrameRate,
    ) -> Vec<(MediaId, i64)> {
        self.sections
            .iter()
            .map(|s| (s.media_id, s.frames(tsm, override_rate)))
            .collect()
    }

    /// Locate the section containing `logical_frame`.
    ///
    /// Returns the section index, the section, and the source frame the
    /// logical frame maps to.
    pub fn media_frame(&self, logical_frame: i64) -> Result<(usize, &EditListSection, i64)> {
        if self.is_empty() {
            return Err(RevueError::NoFrames);
        }
        if logical_frame < 0 || logical_frame >= self.total_native_frames() {
            return Err(RevueError::NoFramesLeft);
        }
        let index = self.section_index(logical_frame);
        let section = &self.sections[index];
        let local = section.start + logical_frame - self.section_start_frame(index);
        Ok((index, section, local))
    }

    /// Jump `skip_by` whole sections from the one containing `ref_frame`,
    /// stopping at either end of the list.
    pub fn skip_sections(&self, ref_frame: i64, skip_by: i64) -> Result<&EditListSection> {
        let (index, _, _) = self.media_frame(ref_frame)?;
        let target = (index as i64).saturating_add(skip_by).clamp(0, self.len() as i64 - 1);
        Ok(&self.sections[target as usize])
    }

    /// Time based variant of [`EditList::skip_sections`].
    pub fn next_section(
        &self,
        ref_time: RationalTime,
        skip_by: i64,
        tsm: TimeSourceMode,
        override_rate: FrameRate,
    ) -> Result<&EditListSection> {
        if self.is_empty() {
            return Err(RevueError::NoFrames);
        }
        let mut start = RationalTime::ZERO;
        for (index, section) in self.sections.iter().enumerate() {
            let range = TimeRange::new(start, section.duration_time(tsm, override_rate));
            if range.end() > ref_time {
                let target = (index as i64)
                    .saturating_add(skip_by)
                    .clamp(0, self.len() as i64 - 1);
                return Ok(&self.sections[target as usize]);
            }
            start = range.end();
        }
        Err(RevueError::NoFramesLeft)
    }

    /// Native rate at `logical_frame`; the last section's rate past the end.
    pub fn frame_rate_at_frame(&self, logical_frame: i64) -> Option<FrameRate> {
        let last = self.len().checked_sub(1)?;
        let index = self.section_index(logical_frame).min(last);
        Some(self.sections[index].rate)
    }

    /// Timeline time at which `logical_frame` starts.
    pub fn time_from_frame(
        &self,
        tsm: TimeSourceMode,
        logical_frame: i64,
        override_rate: FrameRate,
    ) -> RationalTime {
        if tsm != TimeSourceMode::Dynamic || self.is_empty() {
            return RationalTime::from_frames(logical_frame, override_rate);
        }

        let total = self.total_native_frames();
        if logical_frame < total {
            let index = self.section_index(logical_frame);
            let start_time = self.sections[..index]
                .iter()
                .fold(RationalTime::ZERO, |acc, s| acc + s.native_duration());
            let section = &self.sections[index];
            start_time
                + section.rate.frame_duration() * (logical_frame - self.section_start_frame(index))
        } else {
            // overrun continues at the final section's rate
            let last_rate = self.sections[self.len() - 1].rate;
            self.duration_time(tsm, override_rate)
                + last_rate.frame_duration() * (logical_frame - total)
        }
    }

    /// Logical frame displayed at timeline time `time`.
    pub fn logical_frame(
        &self,
        tsm: TimeSourceMode,
        time: RationalTime,
        override_rate: FrameRate,
    ) -> Result<i64> {
        let frame = match tsm {
            TimeSourceMode::Fixed => time.to_frames(override_rate),
            TimeSourceMode::Dynamic | TimeSourceMode::Remapped => {
                let mut frames = 0;
                let mut start = RationalTime::ZERO;
                let mut found = None;
                for section in &self.sections {
                    let duration = section.duration_time(tsm, override_rate);
                    let section_frames = section.frames(tsm, override_rate);
                    if time - start < duration {
                        let within = (time - start)
                            .to_frames(section.sampling_rate(tsm, override_rate))
                            .min(section_frames - 1);
                        found = Some(frames + within);
                        break;
                    }
                    frames += section_frames;
                    start = start + duration;
                }
                found.unwrap_or(frames)
            }
        };

        if !self.is_empty() && (frame < 0 || frame >= self.duration_frames(tsm, override_rate)) {
            return Err(RevueError::NoFramesLeft);
        }
        Ok(frame)
    }

    /// Timeline start of the first section owned by `media_id`, with the
    /// rate its frames play at.
    pub fn section_start_time(
        &self,
        media_id: MediaId,
        tsm: TimeSourceMode,
        override_rate: FrameRate,
    ) -> Result<(RationalTime, FrameRate)> {
        let mut start = RationalTime::ZERO;
        for section in &self.sections {
            if section.media_id == media_id {
                let rate = match tsm {
                    TimeSourceMode::Fixed => override_rate,
                    TimeSourceMode::Dynamic | TimeSourceMode::Remapped => section.rate,
                };
                return Ok((start, rate));
            }
            start = start + section.duration_time(tsm, override_rate);
        }
        Err(RevueError::SourceNotFound(media_id.to_string()))
    }

    /// Convert an optional in/out time pair to a logical frame range.
    /// Ends that fall outside the list keep the full-range default.
    pub fn time_range_to_frame_range(
        &self,
        in_time: Option<RationalTime>,
        out_time: Option<RationalTime>,
        tsm: TimeSourceMode,
        override_rate: FrameRate,
    ) -> (i64, i64) {
        let mut range = (0, self.duration_frames(tsm, override_rate));
        if let Some(Ok(frame)) = in_time.map(|t| self.logical_frame(tsm, t, override_rate)) {
            range.0 = frame;
        }
        if let Some(Ok(frame)) = out_time.map(|t| self.logical_frame(tsm, t, override_rate)) {
            range.1 = frame;
        }
        range
    }
}
