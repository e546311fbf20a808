//! Chunk plans for feeding a document to the push reader.
//!
//! Deterministic plans cover fixed sizes and splits around markup
//! delimiters; fuzz plans pick boundaries from a seeded generator so that a
//! failing seed can be replayed.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryPolicy {
    /// Split only between characters.
    Utf8Aligned,
    /// Split anywhere, including inside multi-byte sequences.
    ByteStream,
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryPolicy::Utf8Aligned => f.write_str("utf8"),
            BoundaryPolicy::ByteStream => f.write_str("bytes"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChunkPlan {
    /// The whole input in one chunk.
    Whole,
    Fixed {
        size: usize,
        policy: BoundaryPolicy,
    },
    Sizes {
        sizes: Vec<usize>,
        policy: BoundaryPolicy,
    },
    Boundaries {
        indices: Vec<usize>,
        policy: BoundaryPolicy,
    },
}

impl fmt::Display for ChunkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkPlan::Whole => f.write_str("whole"),
            ChunkPlan::Fixed { size, policy } => write!(f, "fixed size={size} policy={policy}"),
            ChunkPlan::Sizes { sizes, policy } => write!(
                f,
                "sizes count={} policy={policy} sizes={sizes:?}",
                sizes.len()
            ),
            ChunkPlan::Boundaries { indices, policy } => write!(
                f,
                "boundaries count={} policy={policy} indices={indices:?}",
                indices.len()
            ),
        }
    }
}

impl ChunkPlan {
    pub fn fixed(size: usize) -> Self {
        Self::Fixed {
            size,
            policy: BoundaryPolicy::ByteStream,
        }
    }

    pub fn sizes(sizes: impl Into<Vec<usize>>) -> Self {
        Self::Sizes {
            sizes: sizes.into(),
            policy: BoundaryPolicy::ByteStream,
        }
    }

    pub fn boundaries(indices: impl Into<Vec<usize>>) -> Self {
        Self::Boundaries {
            indices: indices.into(),
            policy: BoundaryPolicy::ByteStream,
        }
    }

    /// Split `input` into chunks. Boundaries that the policy rejects are
    /// dropped; sizes past the end of the input are ignored and any rest is
    /// one final chunk.
    pub fn split<'a>(&self, input: &'a [u8]) -> Vec<&'a [u8]> {
        let points = match self {
            ChunkPlan::Whole => Vec::new(),
            ChunkPlan::Fixed { size, policy } => {
                assert!(*size > 0, "chunk size must be > 0");
                let points = (1..input.len().div_ceil(*size))
                    .map(|i| i * size)
                    .collect::<Vec<_>>();
                filter_boundaries(input, &points, *policy)
            }
            ChunkPlan::Sizes { sizes, policy } => {
                let mut offset = 0usize;
                let mut points = Vec::with_capacity(sizes.len());
                for size in sizes {
                    assert!(*size > 0, "chunk size must be > 0");
                    offset += size;
                    points.push(offset);
                }
                filter_boundaries(input, &points, *policy)
            }
            ChunkPlan::Boundaries { indices, policy } => filter_boundaries(input, indices, *policy),
        };
        let mut chunks = Vec::with_capacity(points.len() + 1);
        let mut last = 0usize;
        for idx in points {
            chunks.push(&input[last..idx]);
            last = idx;
        }
        if last < input.len() || chunks.is_empty() {
            chunks.push(&input[last..]);
        }
        chunks
    }
}

/// Sorted, deduplicated interior boundaries the policy allows.
fn filter_boundaries(input: &[u8], indices: &[usize], policy: BoundaryPolicy) -> Vec<usize> {
    let mut out = indices
        .iter()
        .copied()
        .filter(|&idx| idx > 0 && idx < input.len())
        .filter(|&idx| match policy {
            BoundaryPolicy::ByteStream => true,
            BoundaryPolicy::Utf8Aligned => (input[idx] as i8) >= -0x40,
        })
        .collect::<Vec<_>>();
    out.sort_unstable();
    out.dedup();
    out
}

#[derive(Clone, Debug)]
pub struct ChunkPlanCase {
    pub label: String,
    pub plan: ChunkPlan,
}

/// Deterministic plans plus `fuzz_runs` seeded boundary plans.
pub fn build_chunk_plans(input: &[u8], fuzz_runs: usize, fuzz_seed: u64) -> Vec<ChunkPlanCase> {
    let mut plans = vec![ChunkPlanCase {
        label: "whole".to_string(),
        plan: ChunkPlan::Whole,
    }];
    for size in [1usize, 2, 3, 4, 5, 7, 8, 16, 64] {
        plans.push(ChunkPlanCase {
            label: format!("fixed size={size}"),
            plan: ChunkPlan::fixed(size),
        });
    }

    let markup = markup_boundaries(input);
    if !markup.is_empty() {
        plans.push(ChunkPlanCase {
            label: format!("markup-boundaries count={}", markup.len()),
            plan: ChunkPlan::boundaries(markup.clone()),
        });
    }

    let candidates = (1..input.len()).collect::<Vec<_>>();
    for i in 0..fuzz_runs {
        let seed = fuzz_seed.wrapping_add(i as u64);
        let mut rng = Lcg::new(seed);
        let plan = if candidates.is_empty() {
            ChunkPlan::Whole
        } else {
            let mut picks = if rng.gen_range(2) == 0 {
                markup.clone()
            } else {
                candidates.clone()
            };
            if picks.is_empty() {
                picks = candidates.clone();
            }
            rng.shuffle(&mut picks);
            let max = picks.len().clamp(1, 32);
            picks.truncate(1 + rng.gen_range(max));
            ChunkPlan::boundaries(picks)
        };
        plans.push(ChunkPlanCase {
            label: format!("fuzz boundaries seed=0x{seed:016x}"),
            plan,
        });
    }
    plans
}

/// Positions around the delimiters where a suspended scan is most likely to
/// resume: `<`, `>`, `&`, `;`, quotes, `]` and `-`.
fn markup_boundaries(input: &[u8]) -> Vec<usize> {
    let mut out = Vec::new();
    for (i, &b) in input.iter().enumerate() {
        if matches!(b, b'<' | b'>' | b'&' | b';' | b'"' | b'\'' | b']' | b'-' | b'?') {
            out.push(i);
            out.push(i + 1);
        }
    }
    out.retain(|&idx| idx > 0 && idx < input.len());
    out.sort_unstable();
    out.dedup();
    out
}

pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        self.state
    }

    pub fn gen_range(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() >> 32) as usize % upper
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        if items.len() < 2 {
            return;
        }
        for i in (1..items.len()).rev() {
            let j = self.gen_range(i + 1);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(chunks: &[&[u8]]) -> Vec<u8> {
        chunks.concat()
    }

    #[test]
    fn fixed_plan_covers_input() {
        let input = b"<a>hello</a>";
        let chunks = ChunkPlan::fixed(5).split(input);
        assert_eq!(chunks.len(), 3);
        assert_eq!(joined(&chunks), input);
    }

    #[test]
    fn sizes_past_the_end_are_ignored() {
        let input = b"abcdef";
        let chunks = ChunkPlan::sizes([2, 10, 1]).split(input);
        assert_eq!(chunks, vec![&b"ab"[..], &b"cdef"[..]]);
    }

    #[test]
    fn utf8_policy_keeps_sequences_whole() {
        let input = "é€".as_bytes();
        let plan = ChunkPlan::Boundaries {
            indices: vec![1, 2, 3, 4],
            policy: BoundaryPolicy::Utf8Aligned,
        };
        let chunks = plan.split(input);
        assert_eq!(chunks, vec!["é".as_bytes(), "€".as_bytes()]);
    }

    #[test]
    fn empty_input_yields_one_empty_chunk() {
        assert_eq!(ChunkPlan::fixed(3).split(b""), vec![&b""[..]]);
    }

    #[test]
    fn fuzz_plans_are_reproducible() {
        let input = b"<r a='1'>x&amp;y<![CDATA[z]]></r>";
        let first = build_chunk_plans(input, 8, 42);
        let second = build_chunk_plans(input, 8, 42);
        let labels = |plans: &[ChunkPlanCase]| {
            plans
                .iter()
                .map(|case| format!("{} {}", case.label, case.plan))
                .collect::<Vec<_>>()
        };
        assert_eq!(labels(&first), labels(&second));
        for case in &first {
            assert_eq!(joined(&case.plan.split(input)), input, "{}", case.label);
        }
    }
}
