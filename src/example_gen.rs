
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};

/// The DNA alphabet the generated sequences are drawn from
const ALPHABET: &[u8; 4] = b"ACGT";

/// Creates a random template and a set of noisy full-length reads sampled from it, which we can verify the consensus against.
/// The same seed always produces the same data.
/// # Arguments
/// * `template_len` - the length of the template
/// * `num_reads` - the number of reads to generate from the template
/// * `error_rate` - overall error rate, assumes mismatch, insertion, and deletion are equally likely sub-components of this error rate
/// * `seed` - the random seed
/// # Panics
/// * if `error_rate` is not in [0, 1]
pub fn generate_reads(template_len: usize, num_reads: usize, error_rate: f64, seed: u64) -> (Vec<u8>, Vec<Vec<u8>>) {
    assert!((0.0..=1.0).contains(&error_rate));

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let base_distribution = Uniform::new(0, ALPHABET.len());
    let alt_distribution = Uniform::new(1, ALPHABET.len());
    let error_distribution = Uniform::new(0.0, 1.0);
    let error_type_distribution = Uniform::new(0, 3);

    let template: Vec<u8> = (0..template_len)
        .map(|_i| ALPHABET[rng.sample(base_distribution)])
        .collect();

    let reads: Vec<Vec<u8>> = (0..num_reads)
        .map(|_i| {
            let mut read = Vec::with_capacity(template_len + template_len / 10);
            let mut template_index = 0;
            while template_index < template.len() {
                let c = template[template_index];
                let is_error = rng.sample(error_distribution) < error_rate;
                if !is_error {
                    read.push(c);
                    template_index += 1;
                    continue;
                }

                match rng.sample(error_type_distribution) {
                    0 => {
                        // substitution, always to a different base
                        let c_index = ALPHABET.iter().position(|&a| a == c).unwrap_or(0);
                        let alt_index = (c_index + rng.sample(alt_distribution)) % ALPHABET.len();
                        read.push(ALPHABET[alt_index]);
                        template_index += 1;
                    },
                    1 => {
                        // deletion
                        template_index += 1;
                    },
                    _ => {
                        // insertion
                        read.push(ALPHABET[rng.sample(base_distribution)]);
                    }
                }
            }
            read
        })
        .collect();

    (template, reads)
}
