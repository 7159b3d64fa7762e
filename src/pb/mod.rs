//! Wire types for the Substreams RPC, treated by the rest of this crate as an
//! opaque IDL: we only need enough of `sf.substreams.rpc.v2` and
//! `sf.substreams.v1` to build requests and decode responses. These mirror
//! the real Substreams protobuf schema field-for-field but are hand-written
//! (no `build.rs`/`protoc` step), the same way the teacher crate hand-writes
//! its own module-output schema in `pb::schema`.

pub mod sf {
    pub mod substreams {
        pub mod v1 {
            /// A Substreams package. Only the fields the core needs to build
            /// requests are kept; manifest loading (resolving this from a
            /// `.spkg` file or URL) is an external collaborator.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct Package {
                #[prost(message, optional, tag = "1")]
                pub modules: ::core::option::Option<Modules>,
            }

            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct Modules {
                #[prost(message, repeated, tag = "1")]
                pub modules: ::prost::alloc::vec::Vec<Module>,
            }

            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct Module {
                #[prost(string, tag = "1")]
                pub name: ::prost::alloc::string::String,
                #[prost(uint64, tag = "2")]
                pub initial_block: u64,
            }
        }

        pub mod rpc {
            pub mod v2 {
                use super::super::v1::Modules;

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Request {
                    #[prost(int64, tag = "1")]
                    pub start_block_num: i64,
                    #[prost(string, tag = "2")]
                    pub start_cursor: ::prost::alloc::string::String,
                    #[prost(uint64, tag = "3")]
                    pub stop_block_num: u64,
                    #[prost(bool, tag = "4")]
                    pub final_blocks_only: bool,
                    #[prost(message, optional, tag = "5")]
                    pub modules: ::core::option::Option<Modules>,
                    #[prost(string, tag = "6")]
                    pub output_module: ::prost::alloc::string::String,
                    #[prost(bool, tag = "7")]
                    pub production_mode: bool,
                    #[prost(string, repeated, tag = "10")]
                    pub debug_initial_store_snapshot_for_modules:
                        ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Response {
                    #[prost(oneof = "response::Message", tags = "1, 2, 3, 4, 5, 6")]
                    pub message: ::core::option::Option<response::Message>,
                }

                pub mod response {
                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum Message {
                        #[prost(message, tag = "1")]
                        Session(super::SessionInit),
                        #[prost(message, tag = "2")]
                        Progress(super::ModulesProgress),
                        #[prost(message, tag = "3")]
                        BlockScopedData(super::BlockScopedData),
                        #[prost(message, tag = "4")]
                        BlockUndoSignal(super::BlockUndoSignal),
                        #[prost(message, tag = "5")]
                        DebugSnapshotData(super::BlockDataSnapshot),
                        #[prost(message, tag = "6")]
                        DebugSnapshotComplete(super::BlockSnapshotComplete),
                    }
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct SessionInit {
                    #[prost(string, tag = "1")]
                    pub trace_id: ::prost::alloc::string::String,
                    #[prost(uint64, tag = "2")]
                    pub resolved_start_block: u64,
                    #[prost(uint64, tag = "3")]
                    pub linear_handoff_block: u64,
                    #[prost(uint64, tag = "4")]
                    pub max_parallel_workers: u64,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ModulesProgress {
                    #[prost(message, repeated, tag = "2")]
                    pub stages: ::prost::alloc::vec::Vec<Stage>,
                    #[prost(message, repeated, tag = "3")]
                    pub running_jobs: ::prost::alloc::vec::Vec<RunningJob>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Stage {
                    #[prost(string, repeated, tag = "1")]
                    pub modules: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
                    #[prost(message, repeated, tag = "2")]
                    pub completed_ranges: ::prost::alloc::vec::Vec<BlockRange>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RunningJob {
                    #[prost(uint32, tag = "1")]
                    pub stage: u32,
                    #[prost(uint64, tag = "2")]
                    pub start_block: u64,
                    #[prost(uint64, tag = "3")]
                    pub stop_block: u64,
                    #[prost(uint64, tag = "4")]
                    pub processed_blocks: u64,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockRange {
                    #[prost(uint64, tag = "1")]
                    pub start_block: u64,
                    #[prost(uint64, tag = "2")]
                    pub end_block: u64,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockScopedData {
                    #[prost(message, optional, tag = "1")]
                    pub output: ::core::option::Option<MapModuleOutput>,
                    #[prost(message, optional, tag = "2")]
                    pub clock: ::core::option::Option<Clock>,
                    #[prost(string, tag = "4")]
                    pub cursor: ::prost::alloc::string::String,
                    #[prost(uint64, tag = "5")]
                    pub final_block_height: u64,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct MapModuleOutput {
                    #[prost(string, tag = "1")]
                    pub name: ::prost::alloc::string::String,
                    #[prost(message, optional, tag = "2")]
                    pub map_output: ::core::option::Option<::prost_types::Any>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Clock {
                    #[prost(string, tag = "1")]
                    pub id: ::prost::alloc::string::String,
                    #[prost(uint64, tag = "2")]
                    pub number: u64,
                    #[prost(message, optional, tag = "3")]
                    pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockRef {
                    #[prost(string, tag = "1")]
                    pub id: ::prost::alloc::string::String,
                    #[prost(uint64, tag = "2")]
                    pub number: u64,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockUndoSignal {
                    #[prost(message, optional, tag = "1")]
                    pub last_valid_block: ::core::option::Option<BlockRef>,
                    #[prost(string, tag = "2")]
                    pub last_valid_cursor: ::prost::alloc::string::String,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockDataSnapshot {
                    #[prost(string, tag = "1")]
                    pub module_name: ::prost::alloc::string::String,
                }

                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct BlockSnapshotComplete {
                    #[prost(string, tag = "1")]
                    pub module_name: ::prost::alloc::string::String,
                }
            }
        }
    }
}

pub use sf::substreams::rpc::v2::{
    response::Message as ResponseMessage, BlockDataSnapshot, BlockRange, BlockRef,
    BlockScopedData, BlockSnapshotComplete, BlockUndoSignal, Clock, MapModuleOutput,
    ModulesProgress, Request, Response, RunningJob, SessionInit, Stage,
};
pub use sf::substreams::v1::{Module, Modules, Package};

mod client;
pub use client::StreamClient;
