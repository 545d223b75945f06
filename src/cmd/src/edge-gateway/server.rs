// Copyright 2023 RobustMQ Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use common_base::config::gateway::GatewayConfig;
use common_base::logs::init_log;
use edge_gateway::gateway::Gateway;
use edge_gateway::server::http::server::start_http_server;
use log::error;

#[derive(Parser, Debug)]
#[command(author = "edgegate", version, about = "edgegate: edge gateway for the platform's backend services.", long_about = None)]
#[command(next_line_help = true)]
struct ArgsParams {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    conf: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = ArgsParams::parse();

    let config = match GatewayConfig::load(args.conf.as_deref().map(Path::new)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_log(&config.log_level) {
        eprintln!("{}", e);
        process::exit(1);
    }
    config.log_summary();

    let gateway = match Gateway::new(config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!("failed to start gateway: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = start_http_server(gateway).await {
        error!("gateway HTTP server stopped with error: {}", e);
        process::exit(1);
    }
}
