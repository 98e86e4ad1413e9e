//! Rolling-resample genetic algorithm.
//!
//! A GA tailored to stochastic fitness functions: instead of trusting a
//! single noisy evaluation, every genome keeps a rolling bucket of
//! recent samples ([`FitnessBucket`]) and competes on the bucket mean.
//! Survivors are periodically re-evaluated so stale luck decays, and
//! offspring must be unique against the current population.
//!
//! The fitness functions here are shift simulators ([`fitness`]); the
//! genomes are cyclic dispatch schedules ([`chromosome`]) mutated by a
//! probabilistic operator pipeline ([`operators`]).

pub mod chromosome;
pub mod fitness;
pub mod operators;

pub use chromosome::{CycleGenome, FitnessBucket, Individual, MultiCycleGenome};
pub use fitness::{AllCycleFitness, CycleFitness};
pub use operators::{GeneticOperator, MultiStringOperator, OperatorParams, StringOperator};

use std::hash::Hash;

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use operators::k_tournament;

/// Evaluates genomes. One call is one (noisy) sample.
pub trait FitnessFunction<G> {
    /// Draws one fitness sample for the genome.
    fn evaluate(&mut self, genome: &G) -> f64;

    /// Whether larger fitness is better.
    fn maximising(&self) -> bool {
        true
    }
}

/// Supplies random genomes for population initialisation.
pub trait GenomeBuilder<G> {
    fn random(&mut self, rng: &mut SmallRng) -> G;
}

impl<G, F: FnMut(&mut SmallRng) -> G> GenomeBuilder<G> for F {
    fn random(&mut self, rng: &mut SmallRng) -> G {
        self(rng)
    }
}

/// Run parameters of the rolling GA.
#[derive(Debug, Clone)]
pub struct GaConfig {
    /// Surviving population size.
    pub pop_size: usize,
    /// Offspring per generation.
    pub selection_size: usize,
    /// Fraction of the population surviving by rank (at least one).
    pub elitism: f64,
    /// Maximum generations.
    pub max_gen: u32,
    /// Stop after this many generations without a new best.
    pub con_cutoff: u32,
    /// Fitness bucket capacity.
    pub bucket_size: usize,
    /// Generations of age between resampling rounds (0 disables).
    pub resample_rate: u32,
    /// Evaluations added per resampling round.
    pub resample_size: usize,
    /// Whether non-elite survivors re-enter the selection pool.
    pub allow_survivors: bool,
    /// Tournament size for survivor selection.
    pub tournament_k: usize,
    /// RNG seed; `None` seeds from the operating system.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            pop_size: 100,
            selection_size: 200,
            elitism: 0.0,
            max_gen: 999,
            con_cutoff: 1000,
            bucket_size: 20,
            resample_rate: 1,
            resample_size: 1,
            allow_survivors: true,
            tournament_k: 4,
            seed: None,
        }
    }
}

/// Outcome of a GA run.
#[derive(Debug, Clone)]
pub struct GaResult<G> {
    /// Best genome of the final population.
    pub best: G,
    /// Its bucket-mean fitness.
    pub best_fitness: f64,
    /// Generations actually run.
    pub generations: u32,
}

/// The rolling-resample GA loop.
pub struct RollingGa<G, F, O, B> {
    config: GaConfig,
    fitness: F,
    operator: O,
    builder: B,
    _marker: std::marker::PhantomData<G>,
}

impl<G, F, O, B> RollingGa<G, F, O, B>
where
    G: Clone + Eq + Hash,
    F: FitnessFunction<G>,
    O: GeneticOperator<G>,
    B: GenomeBuilder<G>,
{
    pub fn new(config: GaConfig, fitness: F, operator: O, builder: B) -> Self {
        Self {
            config,
            fitness,
            operator,
            builder,
            _marker: std::marker::PhantomData,
        }
    }

    /// Runs the GA to termination and returns the best genome seen in
    /// the final population.
    ///
    /// Per generation: rank the population (bucket mean, older first on
    /// ties), carry the elite, breed `selection_size` unique offspring
    /// with freshly filled buckets, optionally resample survivors, and
    /// fill the remainder by k-tournament.
    pub fn run(mut self) -> GaResult<G> {
        let cfg = self.config.clone();
        let mut rng = match cfg.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let maximising = self.fitness.maximising();
        let mut population: Vec<Individual<G>> = Vec::with_capacity(cfg.pop_size);
        for _ in 0..cfg.pop_size {
            let genome = self.builder.random(&mut rng);
            let mut ind = Individual::new(genome, cfg.bucket_size);
            for _ in 0..cfg.bucket_size {
                let sample = self.fitness.evaluate(&ind.genome);
                ind.bucket.push(sample);
            }
            ind.age += 1;
            population.push(ind);
        }
        sort_population(&mut population, maximising);
        let mut best_fitness = population[0].fitness();
        let mut stagnant = 0u32;
        let mut generation = 0;
        info!("generation 0: best fitness {best_fitness}");
        for gen in 1..=cfg.max_gen {
            generation = gen;
            let current_size = population.len();
            let elite_count = ((cfg.elitism * current_size as f64) as usize).max(1);
            let mut next_population: Vec<Individual<G>> = Vec::with_capacity(cfg.pop_size);
            let mut rest: Vec<Individual<G>> = Vec::new();
            for (rank, mut ind) in population.into_iter().enumerate() {
                // Elites always refresh their buckets on schedule;
                // non-elites only if they can survive the generation.
                let resample = rank < elite_count || cfg.allow_survivors;
                if resample && cfg.resample_rate > 0 && ind.age % cfg.resample_rate == 0 {
                    for _ in 0..cfg.resample_size {
                        let sample = self.fitness.evaluate(&ind.genome);
                        ind.bucket.push(sample);
                    }
                }
                ind.age += 1;
                if rank < elite_count {
                    next_population.push(ind);
                } else {
                    rest.push(ind);
                }
            }
            let offspring =
                self.operator
                    .produce(&next_population_view(&next_population, &rest), cfg.selection_size, &mut rng);
            let mut pool: Vec<Individual<G>> = offspring
                .into_iter()
                .map(|genome| {
                    let mut ind = Individual::new(genome, cfg.bucket_size);
                    for _ in 0..cfg.bucket_size {
                        let sample = self.fitness.evaluate(&ind.genome);
                        ind.bucket.push(sample);
                    }
                    ind.age += 1;
                    ind
                })
                .collect();
            if cfg.allow_survivors {
                pool.append(&mut rest);
            }
            let survivors = k_tournament(
                pool,
                cfg.pop_size - next_population.len(),
                cfg.tournament_k,
                maximising,
                &mut rng,
            );
            next_population.extend(survivors);
            population = next_population;
            sort_population(&mut population, maximising);
            let generation_best = population[0].fitness();
            if (generation_best > best_fitness) == maximising && generation_best != best_fitness {
                best_fitness = generation_best;
                stagnant = 0;
            } else {
                stagnant += 1;
                if stagnant >= cfg.con_cutoff {
                    break;
                }
            }
            if gen % 10 == 0 {
                debug!("generation {gen}: best fitness {generation_best}");
            }
        }
        info!("finished after {generation} generations: best fitness {}", population[0].fitness());
        GaResult {
            best: population[0].genome.clone(),
            best_fitness: population[0].fitness(),
            generations: generation,
        }
    }
}

/// The parent view offered to the operator: elites first, then the
/// remaining ranked population.
fn next_population_view<G: Clone>(
    elites: &[Individual<G>],
    rest: &[Individual<G>],
) -> Vec<Individual<G>> {
    elites.iter().chain(rest.iter()).cloned().collect()
}

/// Ranks by fitness (best first), breaking ties towards older genomes.
fn sort_population<G>(population: &mut [Individual<G>], maximising: bool) {
    population.sort_by(|a, b| {
        let order = a.fitness().total_cmp(&b.fitness());
        let order = if maximising { order.reverse() } else { order };
        order.then(b.age.cmp(&a.age))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic toy problem with a bounded optimum: each 1 earns a
    /// point, each 0 loses one, and a quadratic length cost keeps
    /// genomes from growing without end (optimum: all ones, length 10).
    struct CountOnes;

    impl FitnessFunction<CycleGenome> for CountOnes {
        fn evaluate(&mut self, genome: &CycleGenome) -> f64 {
            let ones = genome.genes.iter().filter(|&&g| g == 1).count() as f64;
            let zeros = genome.len() as f64 - ones;
            ones - zeros - 0.05 * (genome.len() * genome.len()) as f64
        }
    }

    fn config() -> GaConfig {
        GaConfig {
            pop_size: 20,
            selection_size: 40,
            elitism: 0.1,
            max_gen: 40,
            con_cutoff: 50,
            bucket_size: 3,
            resample_rate: 1,
            resample_size: 1,
            allow_survivors: true,
            tournament_k: 4,
            seed: Some(42),
        }
    }

    fn operator() -> StringOperator {
        StringOperator::new(
            2,
            OperatorParams {
                crossover: 0.9,
                value_mutation: 0.3,
                inversion: 0.1,
                insertion: 0.2,
                deletion: 0.2,
                mutation_count: 1,
                ..OperatorParams::default()
            },
        )
    }

    fn builder(rng: &mut SmallRng) -> CycleGenome {
        use rand::Rng;
        let len = rng.random_range(1..6);
        CycleGenome::new((0..len).map(|_| rng.random_range(0..2)).collect())
    }

    #[test]
    fn test_ga_improves_fitness() {
        let ga = RollingGa::new(config(), CountOnes, operator(), builder);
        let result = ga.run();
        // Random initial genomes (length < 6) score at most 4.2; a run
        // must comfortably beat that on the way to the optimum of 5.
        assert!(result.best_fitness > 3.0, "best {:?}", result.best);
        let ones = result.best.genes.iter().filter(|&&g| g == 1).count();
        assert!(ones * 2 > result.best.genes.len(), "best {:?}", result.best);
    }

    #[test]
    fn test_ga_is_reproducible_with_seed() {
        let a = RollingGa::new(config(), CountOnes, operator(), builder).run();
        let b = RollingGa::new(config(), CountOnes, operator(), builder).run();
        assert_eq!(a.best, b.best);
        assert_eq!(a.best_fitness, b.best_fitness);
    }

    #[test]
    fn test_early_stopping() {
        let mut cfg = config();
        cfg.con_cutoff = 2;
        cfg.max_gen = 1000;
        let result = RollingGa::new(cfg, CountOnes, operator(), builder).run();
        assert!(result.generations < 1000);
    }

    #[test]
    fn test_minimising_objective() {
        struct CountOnesDown;
        impl FitnessFunction<CycleGenome> for CountOnesDown {
            fn evaluate(&mut self, genome: &CycleGenome) -> f64 {
                genome.genes.iter().filter(|&&g| g == 1).count() as f64
                    + 0.05 * genome.len() as f64
            }
            fn maximising(&self) -> bool {
                false
            }
        }
        let result = RollingGa::new(config(), CountOnesDown, operator(), builder).run();
        assert_eq!(
            result.best.genes.iter().filter(|&&g| g == 1).count(),
            0,
            "best {:?}",
            result.best
        );
    }
}
