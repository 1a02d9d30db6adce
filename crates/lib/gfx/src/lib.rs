// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

mod driver;
mod graph;
mod param_block;
mod pass;
mod pool;
mod resources;
mod shader;

#[cfg(test)]
pub(crate) mod test_driver;

pub use driver::*;
pub use graph::*;
pub use param_block::*;
pub use pass::*;
pub use pool::*;
pub use resources::*;
pub use shader::*;
