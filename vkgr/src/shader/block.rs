// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::macros::gr_enum;
use bytemuck::NoUninit;

gr_enum! {
    /// The type of a variable inside a uniform or storage block.
    ShaderVariableDataType
    impl {
        /// Returns the number of rows and columns. Scalars are 1x1, vectors have one row.
        pub const fn dimensions(self) -> (u32, u32) {
            match self {
                Self::I32 | Self::U32 | Self::F32 => (1, 1),
                Self::IVec2 | Self::UVec2 | Self::Vec2 => (1, 2),
                Self::IVec3 | Self::UVec3 | Self::Vec3 => (1, 3),
                Self::IVec4 | Self::UVec4 | Self::Vec4 => (1, 4),
                Self::Mat3 => (3, 3),
                Self::Mat3x4 => (3, 4),
                Self::Mat4 => (4, 4),
            }
        }

        /// Returns the tightly packed size in bytes of one element.
        #[inline]
        pub const fn size(self) -> usize {
            let (rows, columns) = self.dimensions();

            (rows * columns) as usize * 4
        }

        /// Types with more than 4 components are laid out row by row with a matrix stride.
        #[inline]
        pub const fn is_matrix(self) -> bool {
            let (rows, columns) = self.dimensions();

            rows * columns > 4
        }
    }
    ;

    I32,
    IVec2,
    IVec3,
    IVec4,
    U32,
    UVec2,
    UVec3,
    UVec4,
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat3x4,
    Mat4,
}

/// Where a variable lives inside a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderVariableBlockInfo {
    pub offset: usize,
    pub array_size: u32,
    pub array_stride: usize,
    /// Distance between two rows of a matrix. Ignored for other types.
    pub matrix_stride: usize,
}

/// Writes `elements`, an array of values of type `ty`, into `buffer` following the layout of
/// `info`. Matrices are written one row at a time.
///
/// # Panics
///
/// - Panics if `elements` is empty or isn't a whole number of `ty` values.
/// - Panics if there are more elements than `info.array_size`.
/// - Panics if an array or matrix stride is too small.
/// - Panics if a write would land outside of `buffer`.
pub fn write_shader_block_memory<T: NoUninit>(
    ty: ShaderVariableDataType,
    info: &ShaderVariableBlockInfo,
    elements: &[T],
    buffer: &mut [u8],
) {
    let bytes: &[u8] = bytemuck::cast_slice(elements);
    let element_size = ty.size();

    assert!(!bytes.is_empty());
    assert_eq!(bytes.len() % element_size, 0);

    let element_count = bytes.len() / element_size;
    assert!(info.array_size > 0);
    assert!(element_count <= info.array_size as usize);

    let (rows, columns) = ty.dimensions();
    let row_size = columns as usize * 4;

    if ty.is_matrix() {
        assert!(info.matrix_stride >= row_size);
    }

    if element_count > 1 {
        let footprint = if ty.is_matrix() {
            rows as usize * info.matrix_stride
        } else {
            element_size
        };
        assert!(info.array_stride >= footprint);
    }

    for (i, element) in bytes.chunks_exact(element_size).enumerate() {
        let base = info.offset + i * info.array_stride;

        if ty.is_matrix() {
            for (j, row) in element.chunks_exact(row_size).take(rows as usize).enumerate() {
                let offset = base + j * info.matrix_stride;
                buffer[offset..offset + row_size].copy_from_slice(row);
            }
        } else {
            buffer[base..base + element_size].copy_from_slice(element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{write_shader_block_memory, ShaderVariableBlockInfo, ShaderVariableDataType};

    #[test]
    fn scalars_follow_array_stride() {
        let mut words = [0u32; 16];
        let info = ShaderVariableBlockInfo {
            offset: 4,
            array_size: 3,
            array_stride: 16,
            matrix_stride: 0,
        };

        write_shader_block_memory(
            ShaderVariableDataType::U32,
            &info,
            &[1u32, 2, 3],
            bytemuck::cast_slice_mut(&mut words),
        );

        assert_eq!(words[1], 1);
        assert_eq!(words[5], 2);
        assert_eq!(words[9], 3);
        assert_eq!(words[2], 0);
    }

    #[test]
    fn mat3_rows_follow_matrix_stride() {
        let mut floats = [0f32; 12];
        let info = ShaderVariableBlockInfo {
            offset: 0,
            array_size: 1,
            array_stride: 48,
            matrix_stride: 16,
        };
        let matrix: [f32; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

        write_shader_block_memory(
            ShaderVariableDataType::Mat3,
            &info,
            &matrix,
            bytemuck::cast_slice_mut(&mut floats),
        );

        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[3], 0.0);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn only_types_over_four_components_are_matrices() {
        assert!(!ShaderVariableDataType::Vec4.is_matrix());
        assert!(ShaderVariableDataType::Mat3x4.is_matrix());
        assert_eq!(ShaderVariableDataType::Mat3x4.size(), 48);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_panics() {
        let mut buffer = [0u8; 8];
        let info = ShaderVariableBlockInfo {
            offset: 4,
            array_size: 1,
            array_stride: 0,
            matrix_stride: 0,
        };

        write_shader_block_memory(ShaderVariableDataType::Vec2, &info, &[1.0f32, 2.0], &mut buffer);
    }
}
