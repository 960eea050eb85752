//! Index of the media segments already emitted per track, ordered by their
//! original (pre-correction) decode time. The remuxer consults it to align
//! the first samples after a seek with what was produced before.

/// One sample as it was written into a segment. Times are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInfo {
    pub dts: i64,
    pub pts: i64,
    pub duration: i64,
    /// Decode time before timestamp correction.
    pub original_dts: i64,
    pub is_sync_point: bool,
    pub file_position: Option<u64>,
}

impl SampleInfo {
    pub fn new(dts: i64, pts: i64, duration: i64, original_dts: i64, is_sync_point: bool) -> Self {
        Self {
            dts,
            pts,
            duration,
            original_dts,
            is_sync_point,
            file_position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentInfo {
    pub begin_dts: i64,
    pub end_dts: i64,
    pub begin_pts: i64,
    pub end_pts: i64,
    pub original_begin_dts: i64,
    pub original_end_dts: i64,
    /// Keyframes in decode order; always empty for audio.
    pub sync_points: Vec<SampleInfo>,
    pub first_sample: Option<SampleInfo>,
    pub last_sample: Option<SampleInfo>,
}

impl SegmentInfo {
    pub fn append_sync_point(&mut self, sample: SampleInfo) {
        self.sync_points.push(sample);
    }

    /// Latest sync point whose original dts is not after `original_dts`.
    pub fn get_sync_point_before(&self, original_dts: i64) -> Option<&SampleInfo> {
        let idx = self
            .sync_points
            .partition_point(|s| s.original_dts <= original_dts)
            .checked_sub(1)?;
        self.sync_points.get(idx)
    }
}

/// Segments of one track kept sorted by `original_begin_dts`.
#[derive(Debug, Clone)]
pub struct MediaSegmentInfoList {
    track_type: &'static str,
    list: Vec<SegmentInfo>,
    last_append_location: Option<usize>,
}

impl MediaSegmentInfoList {
    pub fn new(track_type: &'static str) -> Self {
        Self {
            track_type,
            list: Vec::new(),
            last_append_location: None,
        }
    }

    pub fn track_type(&self) -> &'static str {
        self.track_type
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.last_append_location = None;
    }

    pub fn segments(&self) -> &[SegmentInfo] {
        &self.list
    }

    /// Index of the segment containing or directly preceding `original_dts`.
    /// `None` when the list is empty or the time precedes every segment.
    fn search_nearest_segment_before(&self, original_dts: i64) -> Option<usize> {
        self.list
            .partition_point(|s| s.original_begin_dts <= original_dts)
            .checked_sub(1)
    }

    fn search_nearest_segment_after(&self, original_dts: i64) -> usize {
        self.search_nearest_segment_before(original_dts)
            .map_or(0, |idx| idx + 1)
    }

    /// Inserts a segment at its position in original decode order.
    pub fn append(&mut self, segment: SegmentInfo) {
        let begin = segment.original_begin_dts;
        let insert_idx = match self.last_append_location {
            // consecutive appends land right after the previous one
            Some(last)
                if last < self.list.len()
                    && begin >= self.list[last].original_end_dts
                    && self
                        .list
                        .get(last + 1)
                        .map_or(true, |next| begin < next.original_begin_dts) =>
            {
                last + 1
            }
            _ => self.search_nearest_segment_after(begin),
        };

        self.last_append_location = Some(insert_idx);
        self.list.insert(insert_idx, segment);
    }

    pub fn get_last_segment_before(&self, original_dts: i64) -> Option<&SegmentInfo> {
        self.search_nearest_segment_before(original_dts)
            .map(|idx| &self.list[idx])
    }

    pub fn get_last_sample_before(&self, original_dts: i64) -> Option<&SampleInfo> {
        self.get_last_segment_before(original_dts)?
            .last_sample
            .as_ref()
    }

    /// Latest keyframe at or before `original_dts`, searching back through
    /// segments that carry none.
    pub fn get_last_sync_point_before(&self, original_dts: i64) -> Option<&SampleInfo> {
        let mut idx = self.search_nearest_segment_before(original_dts)?;
        loop {
            if let Some(sync_point) = self.list[idx].get_sync_point_before(original_dts) {
                return Some(sync_point);
            }
            if idx == 0 {
                return None;
            }
            idx -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn segment(begin: i64, end: i64) -> SegmentInfo {
        let last = SampleInfo::new(end - 10, end - 10, 10, end - 10, false);
        SegmentInfo {
            begin_dts: begin,
            end_dts: end,
            begin_pts: begin,
            end_pts: end,
            original_begin_dts: begin,
            original_end_dts: end,
            sync_points: Vec::new(),
            first_sample: Some(SampleInfo::new(begin, begin, 10, begin, true)),
            last_sample: Some(last),
        }
    }

    #[test]
    fn test_lookup_on_empty_list() {
        let timeline = MediaSegmentInfoList::new("video");
        assert!(timeline.get_last_segment_before(100).is_none());
        assert!(timeline.get_last_sample_before(100).is_none());
        assert!(timeline.get_last_sync_point_before(100).is_none());
    }

    #[test]
    fn test_out_of_order_append_keeps_order() {
        let mut timeline = MediaSegmentInfoList::new("audio");
        timeline.append(segment(0, 100));
        timeline.append(segment(200, 300));
        timeline.append(segment(100, 200));

        let begins: Vec<i64> = timeline.segments().iter().map(|s| s.original_begin_dts).collect();
        assert_eq!(begins, vec![0, 100, 200]);
    }

    #[test]
    fn test_last_segment_before() {
        let mut timeline = MediaSegmentInfoList::new("audio");
        for begin in (0..500).step_by(100) {
            timeline.append(segment(begin, begin + 100));
        }

        assert!(timeline.get_last_segment_before(-1).is_none());
        assert_eq!(timeline.get_last_segment_before(0).unwrap().original_begin_dts, 0);
        assert_eq!(timeline.get_last_segment_before(250).unwrap().original_begin_dts, 200);
        assert_eq!(timeline.get_last_segment_before(10_000).unwrap().original_begin_dts, 400);
        assert_eq!(timeline.get_last_sample_before(250).unwrap().original_dts, 290);
    }

    #[test]
    fn test_sync_point_search_walks_back() {
        let mut timeline = MediaSegmentInfoList::new("video");
        let mut first = segment(0, 100);
        first.append_sync_point(SampleInfo::new(0, 0, 40, 0, true));
        first.append_sync_point(SampleInfo::new(40, 40, 40, 40, true));
        timeline.append(first);
        timeline.append(segment(100, 200));

        let sync = timeline.get_last_sync_point_before(150).unwrap();
        assert_eq!(sync.original_dts, 40);
        assert_eq!(timeline.get_last_sync_point_before(20).unwrap().original_dts, 0);
    }

    #[quickcheck]
    fn prop_segments_stay_sorted(begins: Vec<u16>) -> bool {
        let mut timeline = MediaSegmentInfoList::new("video");
        for begin in begins {
            let begin = begin as i64 * 10;
            timeline.append(segment(begin, begin + 10));
        }
        timeline
            .segments()
            .windows(2)
            .all(|w| w[0].original_begin_dts <= w[1].original_begin_dts)
    }
}
