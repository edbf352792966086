//! Frame/time map construction.
//!
//! [`FrameMapBuilder`] walks an edit list one section at a time, asking each
//! section's source for the whole section in a single batch. A failing
//! source costs only its own section: the slots are filled with a shared
//! blank frame that carries the failure reason, and the walk carries on.

use revue_core::{
    FrameDescriptor, FrameRange, FrameRate, FrameTimeMap, MediaId, MediaType, RationalTime, Result,
    RevueError, SharedFrameDescriptor, TimeSourceMode,
};
use smallvec::smallvec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::edit_list::{EditList, EditListSection};
use crate::source::MediaSource;

/// Sources keyed by identity, as registered with the actor.
pub type SourceTable = HashMap<MediaId, Arc<dyn MediaSource>>;

/// Outcome of one [`FrameMapBuilder::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// A section was consumed; more remain.
    Continue,
    /// Every section has been consumed.
    Done,
}

/// Incremental builder for a [`FrameTimeMap`].
pub struct FrameMapBuilder {
    edit_list: EditList,
    sources: SourceTable,
    media_type: MediaType,
    tsm: TimeSourceMode,
    override_rate: FrameRate,
    next_section: usize,
    cursor: RationalTime,
    position: i64,
    map: FrameTimeMap,
}

impl FrameMapBuilder {
    pub fn new(
        edit_list: EditList,
        sources: SourceTable,
        media_type: MediaType,
        tsm: TimeSourceMode,
        override_rate: FrameRate,
    ) -> Self {
        Self {
            edit_list,
            sources,
            media_type,
            tsm,
            override_rate,
            next_section: 0,
            cursor: RationalTime::ZERO,
            position: 0,
            map: FrameTimeMap::new(),
        }
    }

    /// Skip the first `section` sections. The map then starts at that
    /// section's timeline time and logical frame.
    pub fn starting_at(mut self, section: usize) -> Self {
        let skipped = &self.edit_list.sections()[..section.min(self.edit_list.len())];
        for s in skipped {
            self.cursor = self.cursor + s.duration_time(self.tsm, self.override_rate);
            self.position += s.frames(self.tsm, self.override_rate);
        }
        self.next_section = skipped.len();
        self
    }

    /// Timeline time at which the next frame will be placed.
    pub fn cursor(&self) -> RationalTime {
        self.cursor
    }

    /// Resolve the next section into the map.
    pub async fn step(&mut self) -> Result<BuildStep> {
        let Some(section) = self.edit_list.sections().get(self.next_section).cloned() else {
            return Ok(BuildStep::Done);
        };
        self.next_section += 1;

        let frames = self.resolve_section(&section).await?;
        let period = section.frame_period(self.tsm, self.override_rate);
        for frame in frames {
            self.map.insert(self.cursor, Some(frame));
            self.cursor = self.cursor + period;
            self.position += 1;
        }

        if self.next_section < self.edit_list.len() {
            Ok(BuildStep::Continue)
        } else {
            Ok(BuildStep::Done)
        }
    }

    /// Close the map with the terminating empty slot.
    pub fn finish(mut self) -> FrameTimeMap {
        self.map.insert(self.cursor, None);
        self.map
    }

    /// Step through every section and finish.
    pub async fn run(mut self) -> Result<FrameTimeMap> {
        while self.step().await? == BuildStep::Continue {}
        Ok(self.finish())
    }

    async fn resolve_section(
        &self,
        section: &EditListSection,
    ) -> Result<Vec<SharedFrameDescriptor>> {
        let count = section.frames(self.tsm, self.override_rate).max(0);

        let Some(source) = self.sources.get(&section.media_id) else {
            debug!(media = %section.media_id, "Section has no registered source");
            let blank = Arc::new(FrameDescriptor::blank(self.media_type));
            return Ok(vec![blank; count as usize]);
        };

        let rate = section.sampling_rate(self.tsm, self.override_rate);
        match source
            .media_pointers(self.media_type, smallvec![FrameRange::leading(count)], rate)
            .await
        {
            Ok(batch) => {
                if batch.len() != count as usize {
                    return Err(RevueError::BatchMismatch {
                        expected: count as usize,
                        got: batch.len(),
                    });
                }
                let base = self.position;
                Ok(batch
                    .into_iter()
                    .zip(0_i64..)
                    .map(|(mut frame, offset)| {
                        frame.playhead_logical_frame = Some(base + offset);
                        frame.timecode = section.timecode + offset;
                        Arc::new(frame)
                    })
                    .collect())
            }
            Err(e) => {
                warn!(
                    media = %section.media_id,
                    frames = count,
                    error = %e,
                    "Source failed to resolve section, substituting blank frames"
                );
                let blank = Arc::new(FrameDescriptor::blank_with_error(
                    self.media_type,
                    e.to_string(),
                ));
                Ok(vec![blank; count as usize])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticSource;

    fn table(sources: Vec<SyntheticSource>) -> SourceTable {
        let mut table = SourceTable::new();
        for source in sources {
            table.insert(source.id(), Arc::new(source));
        }
        table
    }

    fn sections(specs: &[(MediaId, i64, FrameRate)]) -> EditList {
        EditList::from_sections(
            specs
                .iter()
                .map(|(id, frames, rate)| EditListSection::new(*id, 0, *frames, *rate)),
        )
    }

    #[tokio::test]
    async fn test_stamps_position_and_timecode() {
        let a = SyntheticSource::builder("a").frames(3).build();
        let b = SyntheticSource::builder("b").frames(2).build();
        let list = sections(&[(a.id(), 3, FrameRate::FPS_24), (b.id(), 2, FrameRate::FPS_24)]);
        let sources = table(vec![a, b]);

        let map = FrameMapBuilder::new(
            list,
            sources,
            MediaType::Image,
            TimeSourceMode::Fixed,
            FrameRate::FPS_24,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(map.len(), 6);
        let frames = map.frames_and_times();
        for (index, (time, frame)) in frames.iter().enumerate() {
            assert_eq!(frame.playhead_logical_frame, Some(index as i64));
            assert_eq!(*time, RationalTime::from_frames(index as i64, FrameRate::FPS_24));
        }
        assert_eq!(frames[4].1.timecode.frame(), 1);
        assert_eq!(map.end_time(), Some(RationalTime::from_frames(5, FrameRate::FPS_24)));
    }

    #[tokio::test]
    async fn test_failing_source_fills_section_with_flagged_blanks() {
        let a = SyntheticSource::builder("a").frames(2).failing("offline").build();
        let b = SyntheticSource::builder("b").frames(2).build();
        let list = sections(&[(a.id(), 2, FrameRate::FPS_24), (b.id(), 2, FrameRate::FPS_24)]);
        let sources = table(vec![a, b]);

        let map = FrameMapBuilder::new(
            list,
            sources,
            MediaType::Image,
            TimeSourceMode::Fixed,
            FrameRate::FPS_24,
        )
        .run()
        .await
        .unwrap();

        let frames = map.frames_and_times();
        assert_eq!(frames.len(), 4);
        assert!(frames[..2].iter().all(|(_, f)| f.is_blank() && f.has_error()));
        assert!(Arc::ptr_eq(&frames[0].1, &frames[1].1));
        assert!(frames[2..].iter().all(|(_, f)| !f.is_blank()));
    }

    #[tokio::test]
    async fn test_short_batch_is_a_hard_error() {
        let a = SyntheticSource::builder("a").frames(4).short_batches().build();
        let list = sections(&[(a.id(), 4, FrameRate::FPS_24)]);
        let sources = table(vec![a]);

        let result = FrameMapBuilder::new(
            list,
            sources,
            MediaType::Image,
            TimeSourceMode::Fixed,
            FrameRate::FPS_24,
        )
        .run()
        .await;
        assert!(matches!(
            result,
            Err(RevueError::BatchMismatch { expected: 4, got: 3 })
        ));
    }

    #[tokio::test]
    async fn test_remapped_counts_frames_at_override_rate() {
        let a = SyntheticSource::builder("a").frames(48).rate(FrameRate::FPS_48).build();
        let list = sections(&[(a.id(), 48, FrameRate::FPS_48)]);
        let sources = table(vec![a]);

        let mut builder = FrameMapBuilder::new(
            list,
            sources,
            MediaType::Image,
            TimeSourceMode::Remapped,
            FrameRate::FPS_24,
        );
        assert_eq!(builder.step().await.unwrap(), BuildStep::Done);
        assert_eq!(builder.cursor(), RationalTime::new(1, 1));
        let map = builder.finish();
        assert_eq!(map.frame_count(), 24);
        let frames = map.frames_and_times();
        assert_eq!(frames[1].1.frame, 2);
    }

    #[tokio::test]
    async fn test_unknown_source_yields_plain_blanks() {
        let list = sections(&[(MediaId::new(), 3, FrameRate::FPS_24)]);
        let map = FrameMapBuilder::new(
            list,
            SourceTable::new(),
            MediaType::Image,
            TimeSourceMode::Fixed,
            FrameRate::FPS_24,
        )
        .run()
        .await
        .unwrap();
        assert_eq!(map.frame_count(), 3);
        assert!(map.frames_and_times().iter().all(|(_, f)| f.is_blank() && !f.has_error()));
    }

    #[tokio::test]
    async fn test_audio_only_source_yields_plain_blanks() {
        let music = SyntheticSource::builder("music")
            .frames(3)
            .media_types([MediaType::Audio])
            .build();
        let clip = SyntheticSource::builder("clip").frames(2).build();
        let list = sections(&[
            (music.id(), 3, FrameRate::FPS_24),
            (clip.id(), 2, FrameRate::FPS_24),
        ]);

        let map = FrameMapBuilder::new(
            list,
            table(vec![music, clip]),
            MediaType::Image,
            TimeSourceMode::Fixed,
            FrameRate::FPS_24,
        )
        .run()
        .await
        .unwrap();

        let frames = map.frames_and_times();
        assert_eq!(frames.len(), 5);
        assert!(frames[..3].iter().all(|(_, f)| f.is_blank() && !f.has_error()));
        assert!(frames[3..].iter().all(|(_, f)| !f.is_blank()));
    }
}
