//! The 32 fixed operator-connection topologies and the data-driven renderer
//! that walks them.
//!
//! Each [`Topology`] names which operators are carriers, which (source,
//! destination) pairs phase-modulate one another, and which single
//! operator has a self-feedback path. A render order is precomputed once
//! per topology (a topological sort with the feedback self-edge removed)
//! so that [`render_algorithm`] never has to re-derive operator
//! dependencies inside the audio thread.

use crate::fm::operator::Operator;
use crate::{NUM_ALGORITHMS, NUM_OPERATORS};

/// Feedback parameter (0..7) to radians, doubling each step.
const FEEDBACK_LEVELS: [f32; 8] = [
    0.0,
    std::f32::consts::PI / 256.0,
    std::f32::consts::PI / 128.0,
    std::f32::consts::PI / 64.0,
    std::f32::consts::PI / 32.0,
    std::f32::consts::PI / 16.0,
    std::f32::consts::PI / 8.0,
    std::f32::consts::PI / 4.0,
];

/// Convert a DX7 feedback parameter (0..7) to a feedback level in radians.
pub fn feedback_param_to_level(param: u8) -> f32 {
    FEEDBACK_LEVELS[param.min(7) as usize]
}

/// One of the 32 fixed six-operator connection topologies.
#[derive(Clone, Copy, Debug)]
pub struct Topology {
    /// Bitmask of operator indices (bit i = operator i) whose output is
    /// summed into the audible mix.
    pub carriers: u8,
    /// (source, destination) pairs: source's output phase-modulates
    /// destination.
    pub modulations: &'static [(usize, usize)],
    /// The one operator with a self-feedback path.
    pub feedback_op: usize,
}

impl Topology {
    fn is_carrier(&self, op: usize) -> bool {
        self.carriers & (1 << op) != 0
    }

    fn carrier_count(&self) -> u32 {
        self.carriers.count_ones()
    }

    /// Topological render order: every modulator appears before the
    /// operator(s) it modulates, with the feedback operator's self-edge
    /// removed (it is handled by a dedicated same-sample feedback path).
    /// Ties broken by ascending operator index for determinism. Works
    /// entirely over fixed-size arrays and operator-count bitmasks so it
    /// can be called from [`Topology::plan`] without touching the heap.
    fn render_order(&self) -> [usize; NUM_OPERATORS] {
        let mut modulated_by: [u8; NUM_OPERATORS] = [0; NUM_OPERATORS];
        for &(src, dst) in self.modulations {
            modulated_by[dst] |= 1 << src;
        }
        modulated_by[self.feedback_op] &= !(1 << self.feedback_op);

        let mut in_degree = [0u32; NUM_OPERATORS];
        for i in 0..NUM_OPERATORS {
            in_degree[i] = modulated_by[i].count_ones();
        }

        let mut ready: u8 = 0;
        for i in 0..NUM_OPERATORS {
            if in_degree[i] == 0 {
                ready |= 1 << i;
            }
        }

        let mut order = [0usize; NUM_OPERATORS];
        let mut order_len = 0usize;
        let mut placed: u8 = 0;

        while ready != 0 {
            // Smallest set bit: the lowest-index ready operator.
            let op = ready.trailing_zeros() as usize;
            ready &= !(1 << op);
            placed |= 1 << op;
            order[order_len] = op;
            order_len += 1;

            for dst in 0..NUM_OPERATORS {
                if modulated_by[dst] & (1 << op) != 0 {
                    modulated_by[dst] &= !(1 << op);
                    in_degree[dst] -= 1;
                    if in_degree[dst] == 0 && placed & (1 << dst) == 0 {
                        ready |= 1 << dst;
                    }
                }
            }
        }

        for i in 0..NUM_OPERATORS {
            if placed & (1 << i) == 0 {
                order[order_len] = i;
                order_len += 1;
            }
        }

        order
    }

    /// Precompute this topology's render order and per-operator modulation
    /// sources once, so [`render_algorithm`] only ever reads fixed-size,
    /// `Copy` data on the audio thread.
    pub fn plan(&self) -> AlgorithmPlan {
        let mut mod_sources: [u8; NUM_OPERATORS] = [0; NUM_OPERATORS];
        for &(src, dst) in self.modulations {
            if src != dst {
                mod_sources[dst] |= 1 << src;
            }
        }
        AlgorithmPlan {
            render_order: self.render_order(),
            mod_sources,
        }
    }
}

/// A topology's render order and modulation-source bitmasks, computed once
/// (typically in [`crate::fm::voice::Voice::load_preset`]) and reused for
/// every block rendered against that algorithm.
#[derive(Clone, Copy, Debug)]
pub struct AlgorithmPlan {
    /// Operator indices in the order they must be rendered so every
    /// modulator is ready before the operator(s) it feeds.
    pub render_order: [usize; NUM_OPERATORS],
    /// `mod_sources[dst]` is a bitmask of operators that phase-modulate
    /// operator `dst` (the feedback self-edge excluded).
    pub mod_sources: [u8; NUM_OPERATORS],
}

macro_rules! topology {
    ($carriers:expr, $modulations:expr, $feedback_op:expr) => {
        Topology {
            carriers: $carriers,
            modulations: &$modulations,
            feedback_op: $feedback_op,
        }
    };
}

/// The 32 fixed DX7 algorithm topologies, indexed 0..31 (DX7 algorithms
/// 1..32). Transcribed from the DX7 operator manual's algorithm chart.
pub static ALGORITHMS: [Topology; NUM_ALGORITHMS] = [
    // Algo 1: 6->5->4->3->2->1*  fb:6
    topology!(0b00_0001, [(5, 4), (4, 3), (3, 2), (2, 1), (1, 0)], 5),
    // Algo 2: 6->5->4->3->2->1*  fb:2
    topology!(0b00_0001, [(5, 4), (4, 3), (3, 2), (2, 1), (1, 0)], 1),
    // Algo 3: 6->5->4->1*  3->2->1*  fb:6
    topology!(0b00_0001, [(5, 4), (4, 3), (3, 0), (2, 1), (1, 0)], 5),
    // Algo 4: 6->5->4->3->2->1*  fb:4
    topology!(0b00_0001, [(5, 4), (4, 3), (3, 2), (2, 1), (1, 0)], 3),
    // Algo 5: 6->5->4->3*  2->1*  fb:6
    topology!(0b00_0101, [(5, 4), (4, 3), (3, 2), (1, 0)], 5),
    // Algo 6: 6->5->4->3*  2->1*  fb:5
    topology!(0b00_0101, [(5, 4), (4, 3), (3, 2), (1, 0)], 4),
    // Algo 7: 6->5->4+3->2->1*  fb:6
    topology!(0b00_0001, [(5, 4), (4, 3), (3, 1), (2, 1), (1, 0)], 5),
    // Algo 8: 4->3  6->5  (3+5)->2->1*  fb:4
    topology!(0b00_0001, [(3, 2), (5, 4), (2, 1), (4, 1), (1, 0)], 3),
    // Algo 9: 4->3  6->5  (3+5)->2->1*  fb:2
    topology!(0b00_0001, [(3, 2), (5, 4), (2, 1), (4, 1), (1, 0)], 1),
    // Algo 10: 6->5->4*  3->2->1*  fb:3
    topology!(0b00_1001, [(5, 4), (4, 3), (2, 1), (1, 0)], 2),
    // Algo 11: 6->5->4*  3->2->1*  fb:6
    topology!(0b00_1001, [(5, 4), (4, 3), (2, 1), (1, 0)], 5),
    // Algo 12: 2->1*  6->5->4->3*  fb:2
    topology!(0b00_0101, [(1, 0), (5, 4), (4, 3), (3, 2)], 1),
    // Algo 13: 2->1*  6->5->4->3*  fb:6
    topology!(0b00_0101, [(1, 0), (5, 4), (4, 3), (3, 2)], 5),
    // Algo 14: 6->5->4->3*  2->1*  fb:6
    topology!(0b00_0101, [(5, 4), (4, 3), (3, 2), (1, 0)], 5),
    // Algo 15: 6->5->3*  2->1*  fb:2
    topology!(0b00_0101, [(1, 0), (5, 4), (4, 2)], 1),
    // Algo 16: 6->5  (5+3+2)->1*  4->3  fb:6
    topology!(0b00_0001, [(5, 4), (4, 0), (3, 2), (2, 0), (1, 0)], 5),
    // Algo 17: 6->5  3->2  (5+4+2)->1*  fb:2
    topology!(0b00_0001, [(5, 4), (4, 0), (3, 0), (2, 1), (1, 0)], 1),
    // Algo 18: 3->2  6->5->4  (2+4)->1*  fb:3
    topology!(0b00_0001, [(2, 1), (5, 4), (4, 3), (1, 0), (3, 0)], 2),
    // Algo 19: 6->5->(4*+3*+2*)  1*  fb:6
    topology!(0b00_1111, [(5, 4), (4, 3), (4, 2), (4, 1)], 5),
    // Algo 20: 3->2->1*  6->(5*+4*)  fb:3
    topology!(0b01_1001, [(2, 1), (1, 0), (5, 4), (5, 3)], 2),
    // Algo 21: 6->(5*+4*+3*)  2->1*  fb:6
    topology!(0b01_1101, [(5, 4), (5, 3), (5, 2), (1, 0)], 5),
    // Algo 22: 6->(5*+4*+3*+2*+1*)  fb:6
    topology!(0b00_1111_1, [(5, 4), (5, 3), (5, 2), (5, 1), (5, 0)], 5),
    // Algo 23: 6->5->4*  3*  2->1*  fb:6
    topology!(0b00_1101, [(5, 4), (4, 3), (1, 0)], 5),
    // Algo 24: 6->5->(4*+3*)  2*  1*  fb:6
    topology!(0b00_1111, [(5, 4), (4, 3), (4, 2)], 5),
    // Algo 25: 6->5->4*  3*  2*  1*  fb:6
    topology!(0b00_1111, [(5, 4), (4, 3)], 5),
    // Algo 26: 6->5->4*  6->3*  2->1*  fb:6
    topology!(0b00_1101, [(5, 4), (4, 3), (5, 2), (1, 0)], 5),
    // Algo 27: 6->5*  3->2->1*  4*  fb:6
    topology!(0b01_1001, [(2, 1), (1, 0), (5, 4)], 5),
    // Algo 28: 5->4->3*  2->1*  6*  fb:5
    topology!(0b10_0101, [(4, 3), (3, 2), (1, 0)], 4),
    // Algo 29: 6->5*  4->3*  2*  1*  fb:6
    topology!(0b01_0111, [(5, 4), (3, 2)], 5),
    // Algo 30: 5->4->3*  6*  2*  1*  fb:5
    topology!(0b10_0111, [(4, 3), (3, 2)], 4),
    // Algo 31: 6->5*  4*  3*  2*  1*  fb:6
    topology!(0b01_1111, [(5, 4)], 5),
    // Algo 32: all carriers, no modulation  fb:6
    topology!(0b11_1111, [], 5),
];

fn scratch_index(block_size: usize, op: usize) -> std::ops::Range<usize> {
    op * block_size..(op + 1) * block_size
}

/// Per-voice scratch state the algorithm renderer needs: one output buffer
/// per operator, and a two-sample feedback state per operator. Owned by
/// the [`crate::fm::voice::Voice`] and reused across blocks so the render
/// path never allocates.
pub struct RenderScratch {
    outputs: Vec<f32>,
    env_scratch: Vec<f32>,
    mod_input: Vec<f32>,
    block_size: usize,
}

impl RenderScratch {
    /// Pre-size scratch storage for the given maximum block size.
    pub fn new(max_block_size: usize) -> Self {
        RenderScratch {
            outputs: vec![0.0; NUM_OPERATORS * max_block_size],
            env_scratch: vec![0.0; max_block_size],
            mod_input: vec![0.0; max_block_size],
            block_size: max_block_size,
        }
    }
}

/// Render one block of a voice's algorithm, returning the carrier mix.
///
/// `operators` must already be gated and have up-to-date cached amplitude
/// and modulation index. `feedback_states` holds 6 two-sample feedback
/// buffers, indexed by operator, owned by the calling Voice and zeroed on
/// gate_on. `freq_ratio`/`amp_mod` are optional per-sample LFO/pitch-bend
/// modulation blocks; `op_enabled` globally mutes an operator's
/// contribution regardless of role.
#[allow(clippy::too_many_arguments)]
pub fn render_algorithm(
    topology: &Topology,
    plan: &AlgorithmPlan,
    operators: &mut [Operator; NUM_OPERATORS],
    feedback_param: u8,
    feedback_states: &mut [[f32; 2]; NUM_OPERATORS],
    scratch: &mut RenderScratch,
    out: &mut [f32],
    freq_ratio: Option<&[f32]>,
    amp_mod: Option<&[f32]>,
    op_enabled: [bool; NUM_OPERATORS],
) {
    let n = out.len();
    assert!(n <= scratch.block_size, "block exceeds pre-sized scratch");
    let fb_level = feedback_param_to_level(feedback_param);

    let mut rendered = [false; NUM_OPERATORS];
    let mod_input = &mut scratch.mod_input[..n];

    for &op_idx in plan.render_order.iter() {
        mod_input.fill(0.0);
        let sources = plan.mod_sources[op_idx];
        for src_idx in 0..NUM_OPERATORS {
            if sources & (1 << src_idx) == 0 {
                continue;
            }
            if rendered[src_idx] {
                let range = scratch_index(scratch.block_size, src_idx);
                let src_out = &scratch.outputs[range][..n];
                for i in 0..n {
                    mod_input[i] += src_out[i];
                }
            }
        }

        let is_fb_op = op_idx == topology.feedback_op && fb_level > 0.0;
        let is_carrier = topology.is_carrier(op_idx);

        let range = scratch_index(scratch.block_size, op_idx);
        let (before, after) = scratch.outputs.split_at_mut(range.start);
        let op_out = &mut after[..n];
        let _ = before;

        if is_fb_op {
            operators[op_idx].render_with_feedback(
                op_out,
                fb_level,
                &mut feedback_states[op_idx],
                freq_ratio,
                &mut scratch.env_scratch[..n],
            );
            if is_carrier {
                let mod_index = operators[op_idx].modulation_index();
                if mod_index > 1e-12 {
                    let amp = operators[op_idx].carrier_amplitude();
                    let scale = amp / mod_index;
                    for sample in op_out.iter_mut() {
                        *sample *= scale;
                    }
                }
            }
        } else {
            operators[op_idx].render(
                op_out,
                Some(&*mod_input),
                is_carrier,
                freq_ratio,
                &mut scratch.env_scratch[..n],
            );
        }

        if is_carrier {
            if let Some(amp_mod) = amp_mod {
                for i in 0..n {
                    op_out[i] *= amp_mod[i];
                }
            }
        }

        if !op_enabled[op_idx] {
            op_out.fill(0.0);
        }

        rendered[op_idx] = true;
    }

    out.fill(0.0);
    for c in 0..NUM_OPERATORS {
        if topology.is_carrier(c) {
            let range = scratch_index(scratch.block_size, c);
            let c_out = &scratch.outputs[range][..n];
            for i in 0..n {
                out[i] += c_out[i];
            }
        }
    }

    let carrier_count = topology.carrier_count();
    if carrier_count > 1 {
        let norm = 1.0 / (carrier_count as f32).sqrt();
        for sample in out.iter_mut() {
            *sample *= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_32_algorithms() {
        assert_eq!(ALGORITHMS.len(), 32);
    }

    #[test]
    fn feedback_levels_within_quarter_pi() {
        for p in 0..8u8 {
            assert!(feedback_param_to_level(p).abs() <= std::f32::consts::FRAC_PI_4 + 1e-6);
        }
    }

    #[test]
    fn feedback_levels_monotone() {
        for p in 1..8u8 {
            assert!(feedback_param_to_level(p) > feedback_param_to_level(p - 1));
        }
    }

    #[test]
    fn algo_32_is_all_carriers_no_modulation() {
        let topo = &ALGORITHMS[31];
        assert_eq!(topo.carriers, 0b11_1111);
        assert!(topo.modulations.is_empty());
    }

    #[test]
    fn every_topology_has_a_valid_render_order() {
        for topo in ALGORITHMS.iter() {
            let order = topo.render_order();
            let mut seen = [false; NUM_OPERATORS];
            for &op in order.iter() {
                seen[op] = true;
            }
            assert!(seen.iter().all(|&s| s), "every operator must appear exactly once");
        }
    }

    #[test]
    fn render_order_respects_modulation_edges() {
        for topo in ALGORITHMS.iter() {
            let order = topo.render_order();
            let mut position = [0usize; NUM_OPERATORS];
            for (pos, &op) in order.iter().enumerate() {
                position[op] = pos;
            }
            for &(src, dst) in topo.modulations {
                if src == dst {
                    continue; // self-feedback, not part of the DAG
                }
                assert!(
                    position[src] < position[dst],
                    "source {} must render before destination {}",
                    src,
                    dst
                );
            }
        }
    }

    #[test]
    fn plan_render_order_matches_render_order() {
        for topo in ALGORITHMS.iter() {
            assert_eq!(topo.plan().render_order, topo.render_order());
        }
    }

    #[test]
    fn plan_mod_sources_match_modulation_edges_excluding_feedback() {
        for topo in ALGORITHMS.iter() {
            let plan = topo.plan();
            let mut expected = [0u8; NUM_OPERATORS];
            for &(src, dst) in topo.modulations {
                if src != dst {
                    expected[dst] |= 1 << src;
                }
            }
            assert_eq!(plan.mod_sources, expected);
        }
    }
}
