//! Genetic operators over cycle genomes.
//!
//! Offspring are produced through a pipeline of independently gated
//! steps: single-point crossover, then value / inversion / swap /
//! relocation / insertion / deletion mutations, each firing with its
//! configured probability. Duplicates of existing genomes are discarded
//! until the requested brood is unique.

use std::collections::HashSet;

use rand::Rng;

use super::chromosome::{CycleGenome, Individual, MultiCycleGenome};

/// Probabilities and intensities of the operator pipeline.
///
/// Each probability gates one step per offspring; `mutation_count` is the
/// number of point changes a firing mutation applies.
#[derive(Debug, Clone)]
pub struct OperatorParams {
    /// Single-point crossover probability.
    pub crossover: f64,
    /// Point mutation probability (gene replaced within its alphabet).
    pub value_mutation: f64,
    /// Sub-range reversal probability.
    pub inversion: f64,
    /// Random pair swap probability.
    pub swap: f64,
    /// Cut-and-reinsert probability.
    pub relocation: f64,
    /// Random gene insertion probability (variable-length strings only).
    pub insertion: f64,
    /// Random gene deletion probability (variable-length strings only).
    pub deletion: f64,
    /// Changes per firing mutation.
    pub mutation_count: usize,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            crossover: 0.0,
            value_mutation: 0.0,
            inversion: 0.0,
            swap: 0.0,
            relocation: 0.0,
            insertion: 0.0,
            deletion: 0.0,
            mutation_count: 1,
        }
    }
}

/// Produces offspring genomes from a parent population.
pub trait GeneticOperator<G> {
    /// Creates `count` offspring, none equal to a parent or to each
    /// other.
    fn produce<R: Rng>(&self, parents: &[Individual<G>], count: usize, rng: &mut R) -> Vec<G>;
}

/// Operator over single variable-length strings ([`CycleGenome`]).
#[derive(Debug, Clone)]
pub struct StringOperator {
    /// Exclusive upper bound of gene values.
    pub alphabet: usize,
    /// Pipeline configuration.
    pub params: OperatorParams,
}

impl StringOperator {
    pub fn new(alphabet: usize, params: OperatorParams) -> Self {
        assert!(alphabet > 0, "empty gene alphabet");
        Self { alphabet, params }
    }

    fn crossover<R: Rng>(&self, a: &[usize], b: &[usize], rng: &mut R) -> Vec<usize> {
        if a.len() <= 1 || b.len() <= 1 {
            return a.to_vec();
        }
        let l1 = rng.random_range(1..a.len());
        let l2 = rng.random_range(1..b.len());
        let mut child = Vec::with_capacity(l1 + l2);
        child.extend_from_slice(&a[..l1]);
        child.extend_from_slice(&b[b.len() - l2..]);
        child
    }
}

impl GeneticOperator<CycleGenome> for StringOperator {
    fn produce<R: Rng>(
        &self,
        parents: &[Individual<CycleGenome>],
        count: usize,
        rng: &mut R,
    ) -> Vec<CycleGenome> {
        let mut seen: HashSet<CycleGenome> =
            parents.iter().map(|p| p.genome.clone()).collect();
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let p = &self.params;
            let i1 = rng.random_range(0..parents.len());
            let mut genes = if parents.len() > 1 && rng.random_bool(p.crossover) {
                let mut i2 = i1;
                while i2 == i1 {
                    i2 = rng.random_range(0..parents.len());
                }
                self.crossover(&parents[i1].genome.genes, &parents[i2].genome.genes, rng)
            } else {
                parents[i1].genome.genes.clone()
            };
            if rng.random_bool(p.value_mutation) {
                mutate_values(&mut genes, self.alphabet, p.mutation_count, rng);
            }
            if rng.random_bool(p.inversion) {
                invert_range(&mut genes, rng);
            }
            if rng.random_bool(p.swap) {
                swap_genes(&mut genes, p.mutation_count, rng);
            }
            if rng.random_bool(p.relocation) {
                relocate_range(&mut genes, rng);
            }
            if rng.random_bool(p.insertion) {
                for _ in 0..p.mutation_count {
                    let at = rng.random_range(0..=genes.len());
                    genes.insert(at, rng.random_range(0..self.alphabet));
                }
            }
            if rng.random_bool(p.deletion) {
                for _ in 0..p.mutation_count {
                    if genes.len() > 1 {
                        let at = rng.random_range(0..genes.len());
                        genes.remove(at);
                    }
                }
            }
            let child = CycleGenome::new(genes);
            if seen.insert(child.clone()) {
                out.push(child);
            }
        }
        out
    }
}

/// Operator over per-location string bundles ([`MultiCycleGenome`]).
///
/// Each mutation picks a target string uniformly; crossover crosses each
/// string with probability `crossover_strings / num_strings` and
/// otherwise copies one parent's whole string. Fixed-length strings are
/// exempt from insertion and deletion, and their crossover keeps the
/// child at the fixed length.
#[derive(Debug, Clone)]
pub struct MultiStringOperator {
    /// Exclusive upper bound of gene values, per string.
    pub alphabets: Vec<usize>,
    /// Required length per string; 0 means variable.
    pub fixed_lengths: Vec<usize>,
    /// Expected number of crossed strings per crossover.
    pub crossover_strings: f64,
    /// Pipeline configuration.
    pub params: OperatorParams,
}

impl MultiStringOperator {
    pub fn new(
        alphabets: Vec<usize>,
        fixed_lengths: Vec<usize>,
        crossover_strings: f64,
        params: OperatorParams,
    ) -> Self {
        assert_eq!(alphabets.len(), fixed_lengths.len());
        assert!(alphabets.iter().all(|&a| a > 0), "empty gene alphabet");
        Self {
            alphabets,
            fixed_lengths,
            crossover_strings,
            params,
        }
    }

    fn num_strings(&self) -> usize {
        self.alphabets.len()
    }

    /// Picks a variable-length string uniformly among those eligible.
    fn random_variable_string<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        if self.fixed_lengths.iter().all(|&l| l > 0) {
            return None;
        }
        loop {
            let s = rng.random_range(0..self.num_strings());
            if self.fixed_lengths[s] == 0 {
                return Some(s);
            }
        }
    }

    fn crossover<R: Rng>(
        &self,
        a: &MultiCycleGenome,
        b: &MultiCycleGenome,
        rng: &mut R,
    ) -> Vec<Vec<usize>> {
        let per_string = self.crossover_strings / self.num_strings() as f64;
        (0..self.num_strings())
            .map(|s| {
                let s1 = &a.strings[s];
                let s2 = &b.strings[s];
                if s1.len() > 1 && s2.len() > 1 && rng.random_bool(per_string.min(1.0)) {
                    let l1 = rng.random_range(1..s1.len());
                    let l2 = if self.fixed_lengths[s] > 0 {
                        self.fixed_lengths[s] - l1
                    } else {
                        rng.random_range(1..s2.len())
                    };
                    let mut child = Vec::with_capacity(l1 + l2);
                    child.extend_from_slice(&s1[..l1]);
                    child.extend_from_slice(&s2[s2.len() - l2..]);
                    child
                } else if rng.random_bool(0.5) {
                    s1.clone()
                } else {
                    s2.clone()
                }
            })
            .collect()
    }
}

impl GeneticOperator<MultiCycleGenome> for MultiStringOperator {
    fn produce<R: Rng>(
        &self,
        parents: &[Individual<MultiCycleGenome>],
        count: usize,
        rng: &mut R,
    ) -> Vec<MultiCycleGenome> {
        let cyclic = parents
            .first()
            .map(|p| p.genome.is_cyclic())
            .unwrap_or(false);
        let mut seen: HashSet<MultiCycleGenome> =
            parents.iter().map(|p| p.genome.clone()).collect();
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let p = &self.params;
            let i1 = rng.random_range(0..parents.len());
            let mut strings = if parents.len() > 1 && rng.random_bool(p.crossover) {
                let mut i2 = i1;
                while i2 == i1 {
                    i2 = rng.random_range(0..parents.len());
                }
                self.crossover(&parents[i1].genome, &parents[i2].genome, rng)
            } else {
                parents[i1].genome.strings.clone()
            };
            if rng.random_bool(p.value_mutation) {
                for _ in 0..p.mutation_count {
                    let s = rng.random_range(0..self.num_strings());
                    mutate_values(&mut strings[s], self.alphabets[s], 1, rng);
                }
            }
            if rng.random_bool(p.inversion) {
                for _ in 0..p.mutation_count {
                    let s = rng.random_range(0..self.num_strings());
                    invert_range(&mut strings[s], rng);
                }
            }
            if rng.random_bool(p.swap) {
                for _ in 0..p.mutation_count {
                    let s = rng.random_range(0..self.num_strings());
                    swap_genes(&mut strings[s], 1, rng);
                }
            }
            if rng.random_bool(p.relocation) {
                for _ in 0..p.mutation_count {
                    let s = rng.random_range(0..self.num_strings());
                    relocate_range(&mut strings[s], rng);
                }
            }
            if rng.random_bool(p.insertion) {
                for _ in 0..p.mutation_count {
                    if let Some(s) = self.random_variable_string(rng) {
                        let at = rng.random_range(0..=strings[s].len());
                        strings[s].insert(at, rng.random_range(0..self.alphabets[s]));
                    }
                }
            }
            if rng.random_bool(p.deletion) {
                for _ in 0..p.mutation_count {
                    if let Some(s) = self.random_variable_string(rng) {
                        if strings[s].len() > 1 {
                            let at = rng.random_range(0..strings[s].len());
                            strings[s].remove(at);
                        }
                    }
                }
            }
            let child = MultiCycleGenome::new(strings, cyclic);
            if seen.insert(child.clone()) {
                out.push(child);
            }
        }
        out
    }
}

/// Replaces `count` random genes with a different value from the
/// alphabet. No-op on alphabets of size one, where no different value
/// exists.
fn mutate_values<R: Rng>(genes: &mut [usize], alphabet: usize, count: usize, rng: &mut R) {
    if genes.is_empty() || alphabet < 2 {
        return;
    }
    for _ in 0..count {
        let i = rng.random_range(0..genes.len());
        genes[i] = (genes[i] + 1 + rng.random_range(0..alphabet - 1)) % alphabet;
    }
}

/// Reverses the order of a random sub-range.
fn invert_range<R: Rng>(genes: &mut [usize], rng: &mut R) {
    if genes.len() <= 1 {
        return;
    }
    let i1 = rng.random_range(0..genes.len());
    let mut i2 = i1;
    while i2 == i1 {
        i2 = rng.random_range(0..genes.len());
    }
    let (from, to) = (i1.min(i2), i1.max(i2));
    genes[from..=to].reverse();
}

/// Swaps `count` random pairs of positions.
fn swap_genes<R: Rng>(genes: &mut [usize], count: usize, rng: &mut R) {
    if genes.len() <= 1 {
        return;
    }
    for _ in 0..count {
        let i = rng.random_range(0..genes.len());
        let mut j = i;
        while j == i {
            j = rng.random_range(0..genes.len());
        }
        genes.swap(i, j);
    }
}

/// Cuts a random sub-range and reinserts it at a different position.
fn relocate_range<R: Rng>(genes: &mut Vec<usize>, rng: &mut R) {
    if genes.len() <= 1 {
        return;
    }
    let a = rng.random_range(0..genes.len());
    let b = rng.random_range(0..genes.len());
    let (start, end) = (a.min(b), a.max(b));
    if end - start == genes.len() - 1 {
        return;
    }
    let mut dest = start;
    while dest == start {
        dest = rng.random_range(0..genes.len() - (end - start));
    }
    let cut: Vec<usize> = genes.drain(start..=end).collect();
    for (offset, gene) in cut.into_iter().enumerate() {
        genes.insert(dest + offset, gene);
    }
}

/// Selects `count` survivors from a pool by repeated k-tournaments.
///
/// Each tournament draws `k` distinct not-yet-selected candidates; the
/// winner is removed from future tournaments. Pools no larger than
/// `count` survive wholesale.
pub fn k_tournament<G: Clone, R: Rng>(
    pool: Vec<Individual<G>>,
    count: usize,
    k: usize,
    maximising: bool,
    rng: &mut R,
) -> Vec<Individual<G>> {
    if count >= pool.len() {
        return pool;
    }
    let mut indexes: Vec<usize> = (0..pool.len()).collect();
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        for j in 0..k.min(indexes.len() - i) {
            let r = rng.random_range(i + j..indexes.len());
            indexes.swap(r, i + j);
        }
        let mut winner = i;
        for j in 1..k.min(indexes.len() - i) {
            let challenger = &pool[indexes[i + j]];
            let champion = &pool[indexes[winner]];
            if maximising == (challenger.fitness() > champion.fitness()) {
                winner = i + j;
            }
        }
        indexes.swap(i, winner);
        out.push(pool[indexes[i]].clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn parents(genomes: Vec<Vec<usize>>) -> Vec<Individual<CycleGenome>> {
        genomes
            .into_iter()
            .map(|g| {
                let mut ind = Individual::new(CycleGenome::new(g), 4);
                ind.bucket.push(1.0);
                ind
            })
            .collect()
    }

    #[test]
    fn test_offspring_are_unique_and_counted() {
        let op = StringOperator::new(
            3,
            OperatorParams {
                crossover: 0.9,
                value_mutation: 0.3,
                insertion: 0.3,
                deletion: 0.3,
                ..OperatorParams::default()
            },
        );
        let mut rng = SmallRng::seed_from_u64(42);
        let pop = parents(vec![vec![0, 1, 2, 0], vec![2, 1, 0, 2], vec![1, 1, 2, 0]]);
        let brood = op.produce(&pop, 10, &mut rng);
        assert_eq!(brood.len(), 10);
        let mut seen: HashSet<&CycleGenome> = pop.iter().map(|p| &p.genome).collect();
        for child in &brood {
            assert!(seen.insert(child), "duplicate offspring {child:?}");
        }
    }

    #[test]
    fn test_deletion_keeps_strings_nonempty() {
        let op = StringOperator::new(
            2,
            OperatorParams {
                deletion: 1.0,
                mutation_count: 10,
                ..OperatorParams::default()
            },
        );
        let mut rng = SmallRng::seed_from_u64(7);
        let pop = parents(vec![vec![0, 1], vec![1, 0, 1]]);
        for child in op.produce(&pop, 5, &mut rng) {
            assert!(!child.is_empty());
        }
    }

    #[test]
    fn test_value_mutation_changes_gene() {
        let mut genes = vec![0, 0, 0, 0];
        let mut rng = SmallRng::seed_from_u64(3);
        mutate_values(&mut genes, 4, 1, &mut rng);
        assert_eq!(genes.iter().filter(|&&g| g != 0).count(), 1);
    }

    #[test]
    fn test_value_mutation_noop_on_unit_alphabet() {
        let mut genes = vec![0, 0];
        let mut rng = SmallRng::seed_from_u64(3);
        mutate_values(&mut genes, 1, 5, &mut rng);
        assert_eq!(genes, vec![0, 0]);
    }

    #[test]
    fn test_invert_preserves_multiset() {
        let mut genes = vec![1, 2, 3, 4, 5];
        let mut rng = SmallRng::seed_from_u64(11);
        invert_range(&mut genes, &mut rng);
        let mut sorted = genes.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_relocate_preserves_multiset_and_length() {
        for seed in 0..20 {
            let mut genes = vec![1, 2, 3, 4, 5, 6];
            let mut rng = SmallRng::seed_from_u64(seed);
            relocate_range(&mut genes, &mut rng);
            assert_eq!(genes.len(), 6);
            let mut sorted = genes.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
        }
    }

    #[test]
    fn test_multi_string_fixed_lengths_respected() {
        let op = MultiStringOperator::new(
            vec![3, 3],
            vec![0, 4],
            2.0,
            OperatorParams {
                crossover: 1.0,
                insertion: 1.0,
                deletion: 1.0,
                mutation_count: 3,
                ..OperatorParams::default()
            },
        );
        let mut rng = SmallRng::seed_from_u64(5);
        let pop: Vec<Individual<MultiCycleGenome>> = vec![
            MultiCycleGenome::new(vec![vec![0, 1, 2], vec![0, 1, 2, 0]], false),
            MultiCycleGenome::new(vec![vec![2, 1], vec![2, 0, 1, 1]], false),
        ]
        .into_iter()
        .map(|g| {
            let mut ind = Individual::new(g, 4);
            ind.bucket.push(1.0);
            ind
        })
        .collect();
        for child in op.produce(&pop, 8, &mut rng) {
            assert_eq!(child.strings[1].len(), 4, "fixed string resized");
            assert!(!child.strings[0].is_empty());
        }
    }

    #[test]
    fn test_tournament_prefers_fit_individuals() {
        let mut rng = SmallRng::seed_from_u64(9);
        let pool: Vec<Individual<CycleGenome>> = (0..10)
            .map(|i| {
                let mut ind = Individual::new(CycleGenome::new(vec![i]), 2);
                ind.bucket.push(i as f64);
                ind
            })
            .collect();
        let survivors = k_tournament(pool, 3, 4, true, &mut rng);
        assert_eq!(survivors.len(), 3);
        let mean: f64 =
            survivors.iter().map(|s| s.fitness()).sum::<f64>() / survivors.len() as f64;
        // Mean of 3 four-way tournament winners out of 0..9 should be
        // well above the pool mean of 4.5.
        assert!(mean > 4.5, "mean {mean}");
    }

    #[test]
    fn test_tournament_small_pool_survives_wholesale() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pool = parents(vec![vec![0], vec![1]]);
        let survivors = k_tournament(pool, 5, 4, true, &mut rng);
        assert_eq!(survivors.len(), 2);
    }
}
