// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use prismq_store::Store;

/// Shared state every route handler sees. `Store` is a cheap `Arc` clone
/// internally, so this derives `Clone` without wrapping it again.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}
