use num_traits::{Num, NumAssignOps};
use smallvec::SmallVec;

use crate::MvarError;

/// Per-axis storage. Nearly all multivariates have four axes or fewer.
pub type AxisVec<T> = SmallVec<[T; 4]>;

/// Strides into the flattened control mesh: `sub_spaces[0] == 1` and
/// `sub_spaces[i] == sub_spaces[i - 1] * lengths[i - 1]`.
pub fn sub_spaces(lengths: &[usize]) -> AxisVec<usize> {
    let mut strides = AxisVec::with_capacity(lengths.len());
    let mut stride = 1;
    for &len in lengths {
        strides.push(stride);
        stride *= len;
    }
    strides
}

pub fn mesh_length(lengths: &[usize]) -> usize {
    lengths.iter().product()
}

/// Convert a per-axis index tuple to its linear offset into a control mesh.
pub fn linear_index(lengths: &[usize], index: &[usize]) -> Result<usize, MvarError> {
    if index.len() != lengths.len() {
        return Err(MvarError::DimensionMismatch {
            expected: lengths.len(),
            actual: index.len(),
        });
    }
    let mut offset = 0;
    let mut stride = 1;
    for (&i, &len) in index.iter().zip(lengths) {
        if i >= len {
            return Err(MvarError::IndexOutOfMesh { index: i, len });
        }
        offset += i * stride;
        stride *= len;
    }
    Ok(offset)
}

/// As [`linear_index`], but indices along periodic axes wrap around (including negative ones).
pub fn linear_index_wrapped(
    lengths: &[usize],
    periodic: &[bool],
    index: &[isize],
) -> Result<usize, MvarError> {
    debug_assert!(periodic.len() == lengths.len());
    let mut wrapped = AxisVec::with_capacity(index.len());
    for (d, &i) in index.iter().enumerate() {
        let len = lengths.get(d).copied().unwrap_or(0);
        let i = if periodic.get(d).copied().unwrap_or(false) && len > 0 {
            i.rem_euclid(len as isize)
        } else if i < 0 {
            return Err(MvarError::IndexOutOfMesh { index: 0, len });
        } else {
            i
        };
        wrapped.push(i as usize);
    }
    linear_index(lengths, &wrapped)
}

/// Inverse of [`linear_index`].
pub fn index_tuple(lengths: &[usize], mut linear: usize) -> AxisVec<usize> {
    let mut index = AxisVec::with_capacity(lengths.len());
    for &len in lengths {
        index.push(linear % len);
        linear /= len;
    }
    index
}

/// Advance `index` odometer-style, axis 0 fastest.
/// Returns false once every index tuple has been visited (index is reset to zero).
pub fn increment_index(index: &mut [usize], lengths: &[usize]) -> bool {
    for d in 0..index.len() {
        index[d] += 1;
        if index[d] < lengths[d] {
            return true;
        }
        index[d] = 0;
    }
    false
}

/// As [`increment_index`] but never touches `skip_axis`.
pub fn increment_index_skip_axis(index: &mut [usize], lengths: &[usize], skip_axis: usize) -> bool {
    for d in 0..index.len() {
        if d == skip_axis {
            continue;
        }
        index[d] += 1;
        if index[d] < lengths[d] {
            return true;
        }
        index[d] = 0;
    }
    false
}

/// Advance `index` within the half open box `[min, max)`.
pub fn increment_index_bounded(index: &mut [usize], min: &[usize], max: &[usize]) -> bool {
    for d in 0..index.len() {
        index[d] += 1;
        if index[d] < max[d] {
            return true;
        }
        index[d] = min[d];
    }
    false
}

/// Iterates over all index tuples `[i_0, ..., i_{n-1}]` with `0 <= i_k < lengths[k]`,
/// axis 0 varying fastest, matching the layout of the control mesh.
pub fn mesh_indices<T: Num + NumAssignOps + Copy + PartialOrd>(
    lengths: &[T],
) -> impl Iterator<Item = AxisVec<T>> + use<T> {
    let lengths: AxisVec<T> = lengths.iter().copied().collect();
    let mut indices: AxisVec<T> = lengths.iter().map(|_| T::zero()).collect();
    let mut done = lengths.iter().any(|&l| l <= T::zero());

    std::iter::from_fn(move || {
        if done {
            return None;
        }

        let current = indices.clone();

        done = true;
        for d in 0..lengths.len() {
            indices[d] += T::one();
            if indices[d] < lengths[d] {
                done = false;
                break;
            }
            indices[d] = T::zero();
        }

        Some(current)
    })
}

/// Iterates over the starting index of every fiber along `axis`, ie. all index tuples
/// with `index[axis] == 0`.
pub fn fiber_starts(lengths: &[usize], axis: usize) -> impl Iterator<Item = AxisVec<usize>> + use<> {
    let mut reduced: AxisVec<usize> = lengths.iter().copied().collect();
    reduced[axis] = 1;
    mesh_indices(&reduced)
}

#[cfg(test)]
mod tests {
    use pretty_assertions as pa;

    use super::*;

    #[test]
    fn sub_spaces_are_cumulative_products() {
        pa::assert_eq!(sub_spaces(&[3, 4, 2]).as_slice(), &[1, 3, 12]);
    }

    #[test]
    fn linear_index_round_trip() {
        let lengths = [3, 4, 2];
        for linear in 0..mesh_length(&lengths) {
            let index = index_tuple(&lengths, linear);
            pa::assert_eq!(linear_index(&lengths, &index).unwrap(), linear);
        }
    }

    #[test]
    fn linear_index_out_of_mesh() {
        let err = linear_index(&[3, 4], &[1, 4]).unwrap_err();
        assert!(matches!(err, MvarError::IndexOutOfMesh { index: 4, len: 4 }));
    }

    #[test]
    fn wrapped_index_on_periodic_axis() {
        let lengths = [5, 2];
        let periodic = [true, false];
        pa::assert_eq!(linear_index_wrapped(&lengths, &periodic, &[-1, 1]).unwrap(), 9);
        pa::assert_eq!(linear_index_wrapped(&lengths, &periodic, &[6, 0]).unwrap(), 1);
        assert!(linear_index_wrapped(&lengths, &periodic, &[0, -1]).is_err());
    }

    #[test]
    fn mesh_indices_general() {
        let indexes = mesh_indices(&[2u8, 3]).map(|i| [i[0], i[1]]).collect::<Vec<_>>();
        pa::assert_eq!(
            indexes,
            vec![[0, 0], [1, 0], [0, 1], [1, 1], [0, 2], [1, 2]]
        );
    }

    #[test]
    fn mesh_indices_single() {
        let indexes = mesh_indices(&[1usize, 1]).collect::<Vec<_>>();
        pa::assert_eq!(indexes.len(), 1);
        assert_eq!(mesh_indices(&[0usize, 3]).count(), 0);
    }

    #[test]
    fn odometer_matches_iterator() {
        let lengths = [2, 3, 2];
        let mut index = [0usize; 3];
        let mut visited = vec![index.to_vec()];
        while increment_index(&mut index, &lengths) {
            visited.push(index.to_vec());
        }
        let expected = mesh_indices(&lengths).map(|i| i.to_vec()).collect::<Vec<_>>();
        pa::assert_eq!(visited, expected);
        pa::assert_eq!(index, [0, 0, 0]);
    }

    #[test]
    fn odometer_skip_axis() {
        let lengths = [2, 3, 2];
        let mut index = [0usize, 2, 0];
        let mut count = 1;
        while increment_index_skip_axis(&mut index, &lengths, 1) {
            assert_eq!(index[1], 2);
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn odometer_bounded() {
        let (min, max) = ([1, 2], [3, 4]);
        let mut index = min;
        let mut count = 1;
        while increment_index_bounded(&mut index, &min, &max) {
            assert!(index[0] >= 1 && index[0] < 3 && index[1] >= 2 && index[1] < 4);
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn fiber_starts_fix_axis() {
        let starts = fiber_starts(&[2, 3], 1).collect::<Vec<_>>();
        assert_eq!(starts.len(), 2);
        assert!(starts.iter().all(|s| s[1] == 0));
    }
}
