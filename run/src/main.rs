/*
 * Township Pandemic/Economy Simulator (TownSim)
 * Copyright (c)  2022. TownSim Developers
 *
 * This file is part of TownSim.
 *
 * TownSim is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, version 3 of the License.
 *
 * TownSim is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with TownSim.  If not, see <https://www.gnu.org/licenses/>.
 *
 */

extern crate dotenv;
#[macro_use]
extern crate log;
extern crate pretty_env_logger;

mod arguments;
mod execute_modes;

use arguments::{Arguments, RunMode};

fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    info!("Township pandemic/economy simulator");

    let arguments = Arguments::load_from_arguments();
    if let Some(threads) = arguments.number_of_threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("Failed to size the worker pool: {}", e);
        }
    }

    let result = match arguments.mode {
        RunMode::Simulate => execute_modes::simulate(arguments),
        RunMode::Train => execute_modes::train(arguments),
        RunMode::Evaluate => execute_modes::evaluate(arguments),
    };
    if let Err(e) = result {
        error!("{:?}", e);
        std::process::exit(1);
    }
    info!("Finished");
}
