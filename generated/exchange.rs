#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoVersion {
    #[prost(uint64, tag = "1")]
    pub major: u64,
    #[prost(uint32, tag = "2")]
    pub minor: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLocalPartition {
    #[prost(uint32, tag = "1")]
    pub partition: u32,
    #[prost(enumeration = "ProtoPartitionState", tag = "2")]
    pub state: i32,
    #[prost(bool, tag = "3")]
    pub primary: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLocalGroup {
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub partitions: ::prost::alloc::vec::Vec<ProtoLocalPartition>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReplica {
    #[prost(string, tag = "1")]
    pub node_id: ::prost::alloc::string::String,
    #[prost(enumeration = "ProtoPartitionState", tag = "2")]
    pub state: i32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPartitionReplicas {
    #[prost(message, repeated, tag = "1")]
    pub replicas: ::prost::alloc::vec::Vec<ProtoReplica>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOwners {
    #[prost(string, repeated, tag = "1")]
    pub node_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoGroupFull {
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    /// Indexed by partition.
    #[prost(message, repeated, tag = "2")]
    pub partitions: ::prost::alloc::vec::Vec<ProtoPartitionReplicas>,
    #[prost(message, repeated, tag = "3")]
    pub owners: ::prost::alloc::vec::Vec<ProtoOwners>,
    #[prost(uint64, tag = "4")]
    pub ideal_digest: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPartitionKey {
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub partition: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSingleMessage {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub exchange_id: ::core::option::Option<ProtoVersion>,
    #[prost(message, repeated, tag = "3")]
    pub groups: ::prost::alloc::vec::Vec<ProtoLocalGroup>,
    #[prost(string, repeated, tag = "4")]
    pub errors: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoFullMessage {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub exchange_id: ::core::option::Option<ProtoVersion>,
    #[prost(message, optional, tag = "3")]
    pub result_version: ::core::option::Option<ProtoVersion>,
    #[prost(message, repeated, tag = "4")]
    pub groups: ::prost::alloc::vec::Vec<ProtoGroupFull>,
    #[prost(bool, tag = "5")]
    pub rebalanced: bool,
    #[prost(message, repeated, tag = "6")]
    pub lost: ::prost::alloc::vec::Vec<ProtoPartitionKey>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoFullAck {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub exchange_id: ::core::option::Option<ProtoVersion>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSingleRequest {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub exchange_id: ::core::option::Option<ProtoVersion>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPartitionsUpdate {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub version: ::core::option::Option<ProtoVersion>,
    #[prost(message, repeated, tag = "3")]
    pub groups: ::prost::alloc::vec::Vec<ProtoLocalGroup>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoEnvelope {
    #[prost(oneof = "proto_envelope::Payload", tags = "1, 2, 3, 4, 5")]
    pub payload: ::core::option::Option<proto_envelope::Payload>,
}
/// Nested message and enum types in `ProtoEnvelope`.
pub mod proto_envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Single(super::ProtoSingleMessage),
        #[prost(message, tag = "2")]
        Full(super::ProtoFullMessage),
        #[prost(message, tag = "3")]
        FullAck(super::ProtoFullAck),
        #[prost(message, tag = "4")]
        SingleRequest(super::ProtoSingleRequest),
        #[prost(message, tag = "5")]
        PartitionsUpdate(super::ProtoPartitionsUpdate),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDelivered {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerFault {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoDeliveryResult {
    #[prost(oneof = "proto_delivery_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_delivery_result::Result>,
}
/// Nested message and enum types in `ProtoDeliveryResult`.
pub mod proto_delivery_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoDelivered),
        #[prost(message, tag = "2")]
        Err(super::ProtoServerFault),
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoPartitionState {
    Unknown = 0,
    Owning = 1,
    Moving = 2,
    Renting = 3,
    Evicted = 4,
}
#[doc = r" Generated client implementations."]
pub mod grpc_exchange_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    pub struct GrpcExchangeClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcExchangeClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcExchangeClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn deliver(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoEnvelope>,
        ) -> Result<tonic::Response<super::ProtoDeliveryResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/exchange.GrpcExchange/Deliver");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for GrpcExchangeClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcExchangeClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcExchangeClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_exchange_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcExchangeServer."]
    #[async_trait]
    pub trait GrpcExchange: Send + Sync + 'static {
        async fn deliver(
            &self,
            request: tonic::Request<super::ProtoEnvelope>,
        ) -> Result<tonic::Response<super::ProtoDeliveryResult>, tonic::Status>;
    }
    #[derive(Debug)]
    pub struct GrpcExchangeServer<T: GrpcExchange> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcExchange> GrpcExchangeServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcExchangeServer<T>
    where
        T: GrpcExchange,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/exchange.GrpcExchange/Deliver" => {
                    #[allow(non_camel_case_types)]
                    struct DeliverSvc<T: GrpcExchange>(pub Arc<T>);
                    impl<T: GrpcExchange> tonic::server::UnaryService<super::ProtoEnvelope> for DeliverSvc<T> {
                        type Response = super::ProtoDeliveryResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoEnvelope>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).deliver(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = DeliverSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcExchange> Clone for GrpcExchangeServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcExchange> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcExchange> tonic::transport::NamedService for GrpcExchangeServer<T> {
        const NAME: &'static str = "exchange.GrpcExchange";
    }
}
