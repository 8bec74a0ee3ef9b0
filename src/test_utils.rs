pub fn linspace(start: f64, end: f64, num: usize) -> impl Iterator<Item = f64> + Clone {
    let step = if num > 1 {
        (end - start) / (num - 1) as f64
    } else {
        0.0
    };
    (0..num).map(move |i| start + i as f64 * step)
}

#[allow(dead_code)]
pub fn init_test_logger() {
    use std::io::Write as _;
    let _ = env_logger::builder()
        .is_test(true)
        .format(|buf, record| {
            // Ansi256 ref: https://hexdocs.pm/color_palette/ansi_color_codes.html
            let bg = anstyle::Ansi256Color(240);
            let level_style = buf
                .default_level_style(record.level())
                .bg_color(Some(bg.into()));
            let grey = anstyle::Ansi256Color(255).on(bg);

            let filepath = match record.file() {
                Some(f) => {
                    // Get just the file name, not the full path.
                    let path = std::path::Path::new(f);
                    match path.file_name() {
                        Some(name) => name.to_string_lossy(),
                        None => "unknown".into(),
                    }
                }
                None => "unknown".into(),
            };
            writeln!(
                buf,
                "{grey}[{grey:#}{level_style}{}{level_style:#}{grey} {}:{}]{grey:#}   {}",
                record.level(),
                filepath,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

/// Unordered set of solution points, compared by greedily matching closest pairs.
#[derive(Clone)]
pub struct ApproxRoots(pub Vec<Vec<f64>>);

impl core::fmt::Debug for ApproxRoots {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl approx::AbsDiffEq for ApproxRoots {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-6
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        let a = &self.0;
        let b = &other.0;
        if a.len() != b.len() {
            return false;
        }

        let mut distances = Vec::with_capacity(a.len() * b.len());
        for (ind_a, pa) in a.iter().enumerate() {
            for (ind_b, pb) in b.iter().enumerate() {
                if pa.len() != pb.len() {
                    return false;
                }
                let dist: f64 = pa.iter().zip(pb).map(|(x, y)| (x - y) * (x - y)).sum();
                distances.push((dist.sqrt(), ind_a, ind_b));
            }
        }
        distances.sort_by(|(dist_a, _, _), (dist_b, _, _)| dist_a.total_cmp(dist_b));

        // Greedily match closest pairs
        let mut used_a = vec![false; a.len()];
        let mut used_b = vec![false; b.len()];
        let mut matches = 0;
        for (dist, ind_a, ind_b) in distances {
            if dist > epsilon || matches >= a.len() {
                break;
            }
            if !used_a[ind_a] && !used_b[ind_b] {
                used_a[ind_a] = true;
                used_b[ind_b] = true;
                matches += 1;
            }
        }
        matches == a.len()
    }
}

impl PartialEq for ApproxRoots {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
