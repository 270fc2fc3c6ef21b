use std::{env, error::Error, path::Path, sync::Arc};

use log::info;
use tokio::net::TcpListener;

use comms::msg::Msg;
use master::{Master, MasterConfig, RelayTransport, Transport, net};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8412";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let conf_path = env::args().nth(1).unwrap_or_else(|| "master.json".into());
    let conf = MasterConfig::load(Path::new(&conf_path))?;

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string())
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr} for {} workers", conf.nw);

    let transport = Arc::new(RelayTransport::new());
    let nw = conf.nw;
    let master = Master::new(conf, Arc::clone(&transport) as Arc<dyn Transport>)?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<(u32, Msg<'static>)>();
    for nid in 0..nw as u32 {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("worker connected from {peer} as peer {nid}");

        let (read_half, write_half) = stream.into_split();
        let (receiver, sender) = comms::channel(read_half, write_half);
        transport.add_peer(nid, sender);
        net::spawn_reader(Arc::clone(&master), nid, receiver, tx.clone());
    }
    drop(tx);

    let dispatcher = tokio::spawn(Arc::clone(&master).dispatch_loop(rx));
    let ret = master.run().await;
    dispatcher.abort();
    ret?;

    Ok(())
}
