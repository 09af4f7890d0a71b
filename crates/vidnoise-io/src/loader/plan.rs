/// Location of one sequence inside the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceIndex {
    /// Index of the video in the file list.
    pub video: usize,
    /// Index of the first frame.
    pub start: usize,
}

/// Enumerate every sequence that fits in the given videos.
///
/// Sequences start every `step` frames and hold `sequence_length` frames spaced
/// `stride` apart. A sequence is kept only when all its frames exist.
pub fn plan_sequences(
    frame_counts: &[usize],
    sequence_length: usize,
    step: usize,
    stride: usize,
) -> Vec<SequenceIndex> {
    let span = (sequence_length - 1) * stride + 1;

    let mut sequences = Vec::new();
    for (video, &count) in frame_counts.iter().enumerate() {
        let mut start = 0;
        while start + span <= count {
            sequences.push(SequenceIndex { video, start });
            start += step;
        }
    }
    sequences
}

/// Top left corner of a `crop` window placed at normalized position `pos`.
pub fn crop_origin(pos: f32, extent: usize, crop: usize) -> usize {
    let room = extent.saturating_sub(crop);
    ((pos * room as f32).round() as usize).min(room)
}
