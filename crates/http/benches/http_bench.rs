use std::hint::black_box;
use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use http::{Response, StatusCode};
use http_body_util::BodyExt;
use tern_http::codec::{RequestDecoder, ResponseEncoder};
use tern_http::connection::HttpConnection;
use tern_http::io::BufReader;
use tern_http::protocol::body::ResponseBody;
use tern_http::protocol::{Message, PayloadItem, PayloadSize, ResponseHead};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;

const SIMPLE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: bench\r\nAccept: */*\r\n\r\n";

fn chunked_request(chunks: usize) -> Vec<u8> {
    let mut request = b"POST /upload HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for _ in 0..chunks {
        request.extend_from_slice(b"400\r\n");
        request.extend_from_slice(&[b'x'; 0x400]);
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"0\r\n\r\n");
    request
}

fn bench_request_decoder(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("request_decoder");

    group.throughput(Throughput::Bytes(SIMPLE_REQUEST.len() as u64));
    group.bench_function("simple_head", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut reader = BufReader::new(SIMPLE_REQUEST);
            let decoded = RequestDecoder::new().decode(&mut reader).await.expect("valid request");
            black_box(decoded);
        });
    });

    let chunked = chunked_request(64);
    let chunked = &chunked;
    group.throughput(Throughput::Bytes(chunked.len() as u64));
    group.bench_function("chunked_body_64k", |b| {
        b.to_async(&runtime).iter(|| async move {
            let mut reader = BufReader::new(&chunked[..]);
            let (_, mut payload) = RequestDecoder::new().decode(&mut reader).await.expect("valid request").expect("request");
            while !payload.decode(&mut reader).await.expect("valid body").is_eof() {}
        });
    });

    group.finish();
}

fn bench_response_encoder(c: &mut Criterion) {
    let body = Bytes::from_static(b"Hello World!");

    c.bench_function("encode_fixed_length_response", |b| {
        b.iter_batched_ref(
            || BytesMut::with_capacity(256),
            |dst| {
                let mut encoder = ResponseEncoder::new();
                let head: ResponseHead = Response::builder().status(StatusCode::OK).body(()).expect("head");
                encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Length(body.len() as u64))), dst).expect("head");
                encoder.encode(Message::Payload(PayloadItem::Chunk(body.clone())), dst).expect("chunk");
                encoder.encode(Message::Payload(PayloadItem::<Bytes>::Eof), dst).expect("eof");
                black_box(dst);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_pipelined_connection(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let input = SIMPLE_REQUEST.repeat(16);
    let input = &input;

    c.bench_function("pipelined_connection_16_requests", |b| {
        b.to_async(&runtime).iter(|| async move {
            let (sender, mut receiver) = mpsc::channel(16);
            let connection = HttpConnection::new(Cursor::new(input.clone()), Vec::new());
            let process = tokio::spawn(connection.process(sender));

            while let Some((request, responder)) = receiver.recv().await {
                let body = request.into_body().collect().await.expect("body").to_bytes();
                responder.respond(Response::new(ResponseBody::from(body))).await.expect("respond");
            }
            black_box(process.await.expect("join")).expect("connection");
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_pipelined_connection);
criterion_main!(benches);
