use crate::grpc::grpc_exchange_server::{GrpcExchange, GrpcExchangeServer};
use crate::grpc::{proto_delivery_result, ProtoDelivered, ProtoDeliveryResult, ProtoEnvelope, ProtoServerFault};
use crate::transport::grpc::convert;
use crate::transport::grpc::RpcServerShutdownSignal;
use crate::transport::{MessageInbox, TransportError};
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the exchange gRPC interface.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    inbox: MessageInbox,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, inbox: MessageInbox) -> Self {
        RpcServer { logger, inbox }
    }

    pub(crate) async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcExchangeServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_deliver(&self, envelope: ProtoEnvelope) -> Result<ProtoDeliveryResult, Status> {
        let message = convert::from_envelope(envelope)?;
        let app_result = self.inbox.deliver(message).await;
        Ok(Self::convert_delivery_result(app_result))
    }

    fn convert_delivery_result(app_result: Result<(), TransportError>) -> ProtoDeliveryResult {
        let result = match app_result {
            Ok(()) => proto_delivery_result::Result::Ok(ProtoDelivered {}),
            Err(e) => proto_delivery_result::Result::Err(ProtoServerFault { message: e.to_string() }),
        };

        ProtoDeliveryResult { result: Some(result) }
    }
}

#[async_trait::async_trait]
impl GrpcExchange for RpcServer {
    async fn deliver(&self, rpc_request_wrapped: Request<ProtoEnvelope>) -> Result<Response<ProtoDeliveryResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_deliver(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}
