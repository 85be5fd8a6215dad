// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use prismq_http::routes::create_docs;

fn main() {
    let docs = create_docs();
    let json = docs.to_json().expect("failed to serialize docs to json");
    println!("{json}");
}
